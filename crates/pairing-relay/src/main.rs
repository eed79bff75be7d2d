//! pairing-relay: WebSocket relay between a playback controller and a client.
//!
//! Connections join a session with a 6-digit pairing code and a role. The
//! controller's playback commands are forwarded to the client of the same
//! session, acknowledgements go back to the controller, and both sides get a
//! `peer_status` update whenever the session's membership changes. Nothing is
//! persisted, queued, or retried.

mod connection;
mod error;
mod media;
mod protocol;
mod server;
mod session;

use clap::Parser;
use tokio::net::TcpListener;

use crate::error::RelayError;
use crate::server::serve;
use crate::session::SessionStore;

#[derive(Parser, Debug)]
#[command(name = "pairing-relay", about = "WebSocket pairing relay for remote playback control")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "WS_PORT", default_value_t = 4000)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "WS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Per-connection outbound queue capacity. Messages beyond it are dropped.
    #[arg(long, default_value_t = 256)]
    outbound_queue: usize,
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairing_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let store = SessionStore::new();

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("pairing-relay listening on ws://{}", addr);

    tokio::select! {
        _ = serve(listener, store.clone(), args.outbound_queue) => {}
        _ = tokio::signal::ctrl_c() => {
            let sessions = store.count().await;
            tracing::info!(sessions, "Shutting down");
        }
    }

    Ok(())
}
