//! Simple WebSocket client example.
//!
//! Run the echo server first: cargo run --example echo_server
//! Then run: cargo run --example client [url]

use std::error::Error;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wsnursery::{ConnectOptions, Message, open_websocket_url};

const DEFAULT_URL: &str = "ws://127.0.0.1:9001/";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    info!("connecting to {url}");

    let replies = open_websocket_url(&url, &ConnectOptions::default(), |ws| async move {
        ws.ping(None).await?;
        info!("ping answered");

        let mut replies = Vec::new();
        ws.send_message("Hello, WebSocket!").await?;
        replies.push(ws.get_message().await?);
        ws.send_message(Message::binary(vec![1u8, 2, 3, 4, 5])).await?;
        replies.push(ws.get_message().await?);
        Ok(replies)
    })
    .await?;

    for reply in replies {
        match reply {
            Message::Text(text) => info!("received text: {text}"),
            Message::Binary(data) => info!("received binary: {data:?}"),
        }
    }
    Ok(())
}
