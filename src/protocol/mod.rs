//! WebSocket protocol core (RFC 6455).
//!
//! Everything in this module is sans-IO: bytes in, events out.

pub mod engine;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use engine::{ProtocolEngine, ProtocolState, WsProtocol};
pub use events::{
    AcceptConnection, BytesMessage, CloseConnection, Event, Headers, Ping, Pong, RejectConnection,
    RejectData, Request, TextMessage,
};
pub use handshake::{WS_GUID, compute_accept_key};
pub use mask::apply_mask;
pub use opcode::OpCode;
