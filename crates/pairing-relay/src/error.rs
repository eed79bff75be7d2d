use serde::Serialize;

/// Failures reported back to the sender as an `error` message.
///
/// The display form is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolError {
    #[error("INVALID_JOIN")]
    InvalidJoin,

    #[error("NOT_JOINED")]
    NotJoined,

    #[error("CLIENT_NOT_CONNECTED")]
    ClientNotConnected,
}

/// Startup faults that stop the relay process.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
