//! Per-connection handler: join, dispatch commands, clean up on close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::ProtocolError;
use crate::media::youtube_video_id;
use crate::protocol::{Command, Inbound, JoinRequest, Outbound, PairingCode, Request, Role};
use crate::session::{Departure, PeerHandle, SessionStore};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    store: SessionStore,
    queue_capacity: usize,
) {
    let (mut sink, mut stream) = ws.split();

    // Every frame for this socket, replies included, goes through one queue.
    let (tx, mut rx) = mpsc::channel::<String>(queue_capacity.max(1));
    let closer = CancellationToken::new();
    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let mut conn = Connection {
        addr,
        handle: PeerHandle::new(id, tx, closer.clone()),
        store,
        binding: None,
    };

    tracing::debug!(peer = %addr, conn = id, "Connection opened");

    loop {
        tokio::select! {
            // Queued messages for this client → its WebSocket
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            // Another connection took our slot.
            _ = closer.cancelled() => {
                tracing::info!(peer = %addr, conn = id, "Replaced by newer connection, closing");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => conn.on_frame(text.as_str()).await,
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => conn.on_frame(text).await,
                        Err(_) => tracing::debug!(peer = %addr, "Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    conn.close().await;
}

/// The (code, role) a connection bound itself to. Never changes once set.
struct Binding {
    code: PairingCode,
    role: Role,
}

struct Connection {
    addr: SocketAddr,
    handle: PeerHandle,
    store: SessionStore,
    binding: Option<Binding>,
}

impl Connection {
    async fn on_frame(&mut self, text: &str) {
        let Some(inbound) = Inbound::parse(text) else {
            tracing::debug!(peer = %self.addr, "Dropping malformed frame");
            return;
        };

        match Request::from(inbound) {
            Request::Join(request) => self.join(request).await,
            Request::Command(command) => self.dispatch(command).await,
            Request::Ignored if self.binding.is_none() => {
                self.reply(&ProtocolError::NotJoined.into());
            }
            Request::Ignored => {
                tracing::debug!(peer = %self.addr, "Ignoring unknown message type");
            }
        }
    }

    async fn join(&mut self, request: Result<JoinRequest, ProtocolError>) {
        if let Some(binding) = &self.binding {
            tracing::debug!(
                peer = %self.addr,
                code = %binding.code,
                role = ?binding.role,
                "Ignoring join from already joined connection"
            );
            return;
        }

        let JoinRequest {
            code,
            role,
            role_name,
        } = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(peer = %self.addr, "Rejected join");
                self.reply(&e.into());
                return;
            }
        };

        if let Some(stale) = self.store.join(&code, role, self.handle.clone()).await {
            tracing::info!(
                peer = %self.addr,
                code = %code,
                role = ?role,
                replaced = stale.id(),
                "Pre-empted existing connection"
            );
        }

        tracing::info!(peer = %self.addr, code = %code, role = ?role, "Client joined");

        self.reply(&Outbound::Joined {
            code: code.clone(),
            role: role_name,
        });
        self.announce_presence(&code).await;
        self.binding = Some(Binding { code, role });
    }

    async fn dispatch(&self, command: Command) {
        let Some(binding) = &self.binding else {
            self.reply(&ProtocolError::NotJoined.into());
            return;
        };

        if binding.role != Role::Controller {
            tracing::debug!(
                peer = %self.addr,
                code = %binding.code,
                action = ?command.action(),
                "Ignoring command from client role"
            );
            return;
        }

        let delivered = match self.store.peer(&binding.code, Role::Client).await {
            Some(client) => client.send(&command.forward()),
            None => false,
        };

        if !delivered {
            tracing::debug!(
                code = %binding.code,
                action = ?command.action(),
                "Client not connected"
            );
            self.reply(&ProtocolError::ClientNotConnected.into());
            return;
        }

        if let Command::Play { url } = &command {
            tracing::info!(
                code = %binding.code,
                video_id = youtube_video_id(url).unwrap_or("-"),
                "Relayed play"
            );
        } else {
            tracing::debug!(code = %binding.code, action = ?command.action(), "Relayed control");
        }
        self.reply(&command.ack());
    }

    async fn announce_presence(&self, code: &PairingCode) {
        if let Some(presence) = self.store.broadcast_presence(code).await {
            tracing::debug!(
                code = %code,
                client_present = presence.client_present,
                control_present = presence.control_present,
                "Presence broadcast"
            );
        }
    }

    fn reply(&self, message: &Outbound) {
        self.handle.send(message);
    }

    async fn close(self) {
        // Stop anyone routing to us before the slot is cleared.
        self.handle.close();

        let Some(Binding { ref code, role }) = self.binding else {
            tracing::debug!(peer = %self.addr, "Anonymous connection closed");
            return;
        };

        tracing::info!(peer = %self.addr, code = %code, role = ?role, "Client disconnected");

        match self.store.leave(code, role, self.handle.id()).await {
            Departure::NotMember => {}
            Departure::SessionClosed { age } => {
                let sessions = self.store.count().await;
                tracing::info!(
                    code = %code,
                    age_secs = age.as_secs(),
                    sessions,
                    "Session closed"
                );
            }
            Departure::Remaining => self.announce_presence(code).await,
        }
    }
}
