//! # wsnursery - WebSocket connections with structured concurrency
//!
//! `wsnursery` runs RFC 6455 WebSocket client and server connections on
//! tokio. Every connection's background reader task lives in a
//! [`Nursery`], a task group that cancels its siblings when one task fails
//! and never outlives its owner.
//!
//! ## Features
//!
//! - **Sans-IO protocol engine**: framing and handshakes never touch a socket
//! - **Scoped clients**: [`open_websocket`] bounds connect and disconnect with timeouts
//! - **Backpressure**: a bounded message queue stops reading from the network when full
//! - **Ping/pong tracking**: `ping()` resolves when the matching pong arrives
//! - **TLS** for `wss://` behind the `tls-rustls` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsnursery::{ConnectOptions, open_websocket};
//!
//! let reply = open_websocket("localhost", 8000, "/", false, &ConnectOptions::default(), |ws| async move {
//!     ws.send_message("hello").await?;
//!     ws.get_message().await
//! })
//! .await?;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod nursery;
pub mod protocol;
pub mod server;
pub mod url;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use client::{
    Failure, connect_websocket, connect_websocket_url, open_websocket, open_websocket_url, unify,
};
pub use config::{AcceptOptions, ConnectOptions, ConnectionConfig, ServerOptions};
pub use connection::{Role, WebSocketConnection};
pub use endpoint::{Endpoint, Transport};
pub use error::{Error, Rejection, Result};
pub use message::{CloseCode, CloseReason, Message};
pub use nursery::{Nursery, NurseryHandle};
pub use protocol::{
    Headers, OpCode, ProtocolEngine, ProtocolState, WS_GUID, WsProtocol, compute_accept_key,
};
pub use server::{WebSocketRequest, WebSocketServer, serve_websocket};
pub use url::WsUrl;
