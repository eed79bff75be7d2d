//! Relay-level wire protocol shared with the controller and client apps.
//!
//! Inbound frames are decoded into a closed set of tagged variants. A frame
//! whose `type` is not recognised becomes [`Inbound::Unknown`]; a frame that is
//! not JSON, has no `type`, or is missing a required field fails to decode and
//! is dropped by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Lower bound for a relayed playback speed.
pub const MIN_SPEED: f64 = 0.25;

/// Upper bound for a relayed playback speed.
pub const MAX_SPEED: f64 = 2.0;

/// Six ASCII digits shared out-of-band between the two peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    pub fn parse(code: &str) -> Option<Self> {
        if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(code.to_owned()))
        } else {
            None
        }
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a session a connection plays.
///
/// The apps spell the controller role `"control"`; `"controller"` is accepted
/// on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Role {
    #[serde(rename = "control", alias = "controller")]
    Controller,
    #[serde(rename = "client")]
    Client,
}

/// A frame received from either app.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Join fields are kept loose so bad values surface as `INVALID_JOIN`
    /// instead of a silent drop.
    Join {
        #[serde(default)]
        code: Value,
        #[serde(default)]
        role: Value,
    },
    Play {
        url: String,
    },
    Pause,
    Resume,
    Speed {
        speed: f64,
    },
    Stop,
    Seek {
        seconds: f64,
    },
    Next,
    Previous,
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Decode a text frame. Returns `None` for malformed payloads.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// A validated join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub code: PairingCode,
    pub role: Role,
    /// Role as the peer spelled it, echoed back in `joined`.
    pub role_name: String,
}

impl JoinRequest {
    pub fn validate(code: &Value, role: &Value) -> Result<Self, ProtocolError> {
        let code = code
            .as_str()
            .and_then(PairingCode::parse)
            .ok_or(ProtocolError::InvalidJoin)?;
        let role_name = role.as_str().ok_or(ProtocolError::InvalidJoin)?.to_owned();
        let role = Role::deserialize(role).map_err(|_| ProtocolError::InvalidJoin)?;
        Ok(Self {
            code,
            role,
            role_name,
        })
    }
}

/// A playback command issued by the controller and relayed to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play { url: String },
    Pause,
    Resume,
    /// Always within `[MIN_SPEED, MAX_SPEED]`.
    Speed(f64),
    Stop,
    Seek(f64),
    Next,
    Previous,
}

impl Command {
    pub fn speed(raw: f64) -> Self {
        Command::Speed(raw.clamp(MIN_SPEED, MAX_SPEED))
    }

    pub fn action(&self) -> Action {
        match self {
            Command::Play { .. } => Action::Play,
            Command::Pause => Action::Pause,
            Command::Resume => Action::Resume,
            Command::Speed(_) => Action::Speed,
            Command::Stop => Action::Stop,
            Command::Seek(_) => Action::Seek,
            Command::Next => Action::Next,
            Command::Previous => Action::Previous,
        }
    }

    /// The frame delivered to the client.
    pub fn forward(&self) -> Outbound {
        match self {
            Command::Play { url } => Outbound::Play { url: url.clone() },
            _ => {
                let (speed, seconds) = self.params();
                Outbound::Control {
                    action: self.action(),
                    speed,
                    seconds,
                }
            }
        }
    }

    /// The acknowledgement returned to the controller once forwarded.
    pub fn ack(&self) -> Outbound {
        let (speed, seconds) = self.params();
        Outbound::Ack {
            action: self.action(),
            speed,
            seconds,
        }
    }

    fn params(&self) -> (Option<f64>, Option<f64>) {
        match *self {
            Command::Speed(speed) => (Some(speed), None),
            Command::Seek(seconds) => (None, Some(seconds)),
            _ => (None, None),
        }
    }
}

/// What an inbound frame asks the relay to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join(Result<JoinRequest, ProtocolError>),
    Command(Command),
    Ignored,
}

impl From<Inbound> for Request {
    fn from(inbound: Inbound) -> Self {
        let command = match inbound {
            Inbound::Join { code, role } => {
                return Request::Join(JoinRequest::validate(&code, &role));
            }
            Inbound::Unknown => return Request::Ignored,
            Inbound::Play { url } => Command::Play { url },
            Inbound::Pause => Command::Pause,
            Inbound::Resume => Command::Resume,
            Inbound::Speed { speed } => Command::speed(speed),
            Inbound::Stop => Command::Stop,
            Inbound::Seek { seconds } => Command::Seek(seconds),
            Inbound::Next => Command::Next,
            Inbound::Previous => Command::Previous,
        };
        Request::Command(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Play,
    Pause,
    Resume,
    Speed,
    Stop,
    Seek,
    Next,
    Previous,
}

/// Occupancy of both roles in a session, derived at broadcast time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub client_present: bool,
    pub control_present: bool,
}

/// Messages the relay sends to either app.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Joined {
        code: PairingCode,
        role: String,
    },
    Ack {
        action: Action,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
    },
    Error {
        error: ProtocolError,
    },
    PeerStatus(Presence),
    Play {
        url: String,
    },
    Control {
        action: Action,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seconds: Option<f64>,
    },
}

impl From<ProtocolError> for Outbound {
    fn from(error: ProtocolError) -> Self {
        Outbound::Error { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(text: &str) -> Request {
        Request::from(Inbound::parse(text).expect("frame should decode"))
    }

    #[test]
    fn pairing_code_requires_six_ascii_digits() {
        assert!(PairingCode::parse("012345").is_some());
        assert!(PairingCode::parse("12345").is_none());
        assert!(PairingCode::parse("1234567").is_none());
        assert!(PairingCode::parse("12a456").is_none());
        assert!(PairingCode::parse("１２３４５６").is_none());
        assert!(PairingCode::parse("").is_none());
    }

    #[test]
    fn join_accepts_both_role_spellings() {
        let req = request(r#"{"type":"join","code":"123456","role":"control"}"#);
        assert_eq!(
            req,
            Request::Join(Ok(JoinRequest {
                code: PairingCode::parse("123456").unwrap(),
                role: Role::Controller,
                role_name: "control".into(),
            }))
        );

        let req = request(r#"{"type":"join","code":"123456","role":"controller"}"#);
        assert!(matches!(
            req,
            Request::Join(Ok(JoinRequest { role: Role::Controller, ref role_name, .. }))
                if role_name == "controller"
        ));

        let req = request(r#"{"type":"join","code":"654321","role":"client"}"#);
        assert!(matches!(req, Request::Join(Ok(JoinRequest { role: Role::Client, .. }))));
    }

    #[test]
    fn bad_join_fields_are_invalid_join_not_dropped() {
        for text in [
            r#"{"type":"join","code":"12345","role":"client"}"#,
            r#"{"type":"join","code":123456,"role":"client"}"#,
            r#"{"type":"join","code":"123456","role":"viewer"}"#,
            r#"{"type":"join","code":"123456"}"#,
            r#"{"type":"join"}"#,
        ] {
            assert_eq!(
                request(text),
                Request::Join(Err(ProtocolError::InvalidJoin)),
                "{text}"
            );
        }
    }

    #[test]
    fn malformed_frames_do_not_decode() {
        assert!(Inbound::parse("not json").is_none());
        assert!(Inbound::parse("42").is_none());
        assert!(Inbound::parse(r#"{"code":"123456"}"#).is_none());
        assert!(Inbound::parse(r#"{"type":"play"}"#).is_none());
        assert!(Inbound::parse(r#"{"type":"speed","speed":"fast"}"#).is_none());
        assert!(Inbound::parse(r#"{"type":"seek"}"#).is_none());
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert_eq!(request(r#"{"type":"volume","level":3}"#), Request::Ignored);
    }

    #[test]
    fn speed_is_clamped_on_decode() {
        assert_eq!(
            request(r#"{"type":"speed","speed":3.0}"#),
            Request::Command(Command::Speed(MAX_SPEED))
        );
        assert_eq!(
            request(r#"{"type":"speed","speed":0.1}"#),
            Request::Command(Command::Speed(MIN_SPEED))
        );
        assert_eq!(
            request(r#"{"type":"speed","speed":1}"#),
            Request::Command(Command::Speed(1.0))
        );
    }

    #[test]
    fn integer_seek_decodes() {
        assert_eq!(
            request(r#"{"type":"seek","seconds":-10}"#),
            Request::Command(Command::Seek(-10.0))
        );
    }

    #[test]
    fn forwarded_and_ack_shapes() {
        let play = Command::Play {
            url: "https://youtu.be/abcdefg".into(),
        };
        assert_eq!(
            serde_json::to_value(play.forward()).unwrap(),
            json!({"type": "play", "url": "https://youtu.be/abcdefg"})
        );
        assert_eq!(
            serde_json::to_value(play.ack()).unwrap(),
            json!({"type": "ack", "action": "play"})
        );

        let speed = Command::speed(5.0);
        assert_eq!(
            serde_json::to_value(speed.forward()).unwrap(),
            json!({"type": "control", "action": "speed", "speed": 2.0})
        );
        assert_eq!(
            serde_json::to_value(speed.ack()).unwrap(),
            json!({"type": "ack", "action": "speed", "speed": 2.0})
        );

        assert_eq!(
            serde_json::to_value(Command::Seek(10.0).forward()).unwrap(),
            json!({"type": "control", "action": "seek", "seconds": 10.0})
        );
        assert_eq!(
            serde_json::to_value(Command::Previous.forward()).unwrap(),
            json!({"type": "control", "action": "previous"})
        );
    }

    #[test]
    fn server_message_shapes() {
        let joined = Outbound::Joined {
            code: PairingCode::parse("123456").unwrap(),
            role: "control".into(),
        };
        assert_eq!(
            serde_json::to_value(joined).unwrap(),
            json!({"type": "joined", "code": "123456", "role": "control"})
        );

        let status = Outbound::PeerStatus(Presence {
            client_present: true,
            control_present: false,
        });
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({"type": "peer_status", "clientPresent": true, "controlPresent": false})
        );

        assert_eq!(
            serde_json::to_value(Outbound::from(ProtocolError::ClientNotConnected)).unwrap(),
            json!({"type": "error", "error": "CLIENT_NOT_CONNECTED"})
        );
    }
}
