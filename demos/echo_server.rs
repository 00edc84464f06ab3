//! Simple WebSocket echo server example.
//!
//! Run with: cargo run --example echo_server
//! Then connect with: cargo run --example client

use std::error::Error;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wsnursery::{AcceptOptions, ServerOptions, WebSocketRequest, serve_websocket};

const HOST: &str = "127.0.0.1";
const PORT: u16 = 9001;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wsnursery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("WebSocket echo server listening on ws://{HOST}:{PORT}");
    serve_websocket(echo, Some(HOST), PORT, ServerOptions::default()).await?;
    Ok(())
}

async fn echo(request: WebSocketRequest) -> wsnursery::Result<()> {
    info!(path = request.path(), remote = ?request.remote(), "handshake request");
    let ws = request.accept(AcceptOptions::default()).await?;

    loop {
        match ws.get_message().await {
            Ok(message) => {
                info!(len = message.len(), text = message.is_text(), "echoing message");
                ws.send_message(message).await?;
            }
            Err(err) => {
                info!(reason = ?err.close_reason(), "session ended");
                return Ok(());
            }
        }
    }
}
