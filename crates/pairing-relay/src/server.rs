//! Accept loop: upgrade each TCP connection to WebSocket and hand it to its own task.

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::session::SessionStore;

/// Accept connections forever. Each one runs in its own task and shares `store`.
pub async fn serve(listener: TcpListener, store: SessionStore, queue_capacity: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store, queue_capacity).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
