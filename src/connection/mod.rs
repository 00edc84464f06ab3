//! WebSocket connections.
//!
//! A [`WebSocketConnection`] turns a transport plus a protocol engine into a
//! message-oriented API with backpressure, ping/pong and the closing
//! handshake.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - opening handshake in progress
//! 2. **Open** - messages flow both ways
//! 3. **Closing** - one side sent a close frame
//! 4. **Closed** - close reason recorded, transport closed
//!
//! A server may also reject the handshake, going from connecting straight
//! to closed.

mod latch;
mod pings;
mod role;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::WebSocketConnection;
pub use role::Role;
