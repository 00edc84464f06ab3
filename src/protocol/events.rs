//! Events exchanged with a protocol engine.
//!
//! Incoming bytes are turned into events by [`ProtocolEngine::feed`], and
//! outgoing events are turned into bytes by [`ProtocolEngine::send`].
//!
//! [`ProtocolEngine::feed`]: crate::protocol::ProtocolEngine::feed
//! [`ProtocolEngine::send`]: crate::protocol::ProtocolEngine::send

/// HTTP header list, in wire order.
pub type Headers = Vec<(String, String)>;

/// An opening handshake request.
///
/// Sent by clients. On the server side `extra_headers` holds every header of
/// the received request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// Value of the `Host` header.
    pub host: String,
    /// Request target (path and query).
    pub target: String,
    /// Offered subprotocols, in preference order.
    pub subprotocols: Vec<String>,
    /// Offered extensions.
    pub extensions: Vec<String>,
    /// Additional headers.
    pub extra_headers: Headers,
}

/// Server accepted the opening handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AcceptConnection {
    /// Selected subprotocol.
    pub subprotocol: Option<String>,
    /// Additional headers. On the client side, every response header.
    pub extra_headers: Headers,
}

/// Server rejected the opening handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectConnection {
    /// HTTP status code (anything but 101).
    pub status_code: u16,
    /// Response headers.
    pub headers: Headers,
    /// Whether [`RejectData`] events follow.
    pub has_body: bool,
}

/// A chunk of a rejection response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectData {
    /// Body bytes.
    pub data: Vec<u8>,
    /// Set on the last chunk.
    pub body_finished: bool,
}

/// A chunk of a text message.
///
/// Chunks never split a UTF-8 sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    /// Decoded text.
    pub data: String,
    /// Set on the last chunk of a frame.
    pub frame_finished: bool,
    /// Set on the last chunk of the message.
    pub message_finished: bool,
}

/// A chunk of a binary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesMessage {
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Set on the last chunk of a frame.
    pub frame_finished: bool,
    /// Set on the last chunk of the message.
    pub message_finished: bool,
}

/// A ping control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    /// Application data (at most 125 bytes).
    pub payload: Vec<u8>,
}

impl Ping {
    /// The pong that answers this ping.
    #[must_use]
    pub fn response(&self) -> Pong {
        Pong {
            payload: self.payload.clone(),
        }
    }
}

/// A pong control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    /// Application data (at most 125 bytes).
    pub payload: Vec<u8>,
}

/// A close control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseConnection {
    /// Close code (1005 when the frame carried none).
    pub code: u16,
    /// Optional reason text.
    pub reason: Option<String>,
}

impl CloseConnection {
    /// The close frame that completes the handshake started by this one.
    #[must_use]
    pub fn response(&self) -> CloseConnection {
        CloseConnection {
            code: self.code,
            reason: self.reason.clone(),
        }
    }
}

/// Any event produced or consumed by a protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Opening handshake request.
    Request(Request),
    /// Opening handshake accepted.
    AcceptConnection(AcceptConnection),
    /// Opening handshake rejected.
    RejectConnection(RejectConnection),
    /// Rejection body chunk.
    RejectData(RejectData),
    /// Text message chunk.
    TextMessage(TextMessage),
    /// Binary message chunk.
    BytesMessage(BytesMessage),
    /// Ping.
    Ping(Ping),
    /// Pong.
    Pong(Pong),
    /// Close.
    CloseConnection(CloseConnection),
}

impl Event {
    /// Short name of the event kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Event::Request(_) => "Request",
            Event::AcceptConnection(_) => "AcceptConnection",
            Event::RejectConnection(_) => "RejectConnection",
            Event::RejectData(_) => "RejectData",
            Event::TextMessage(_) => "TextMessage",
            Event::BytesMessage(_) => "BytesMessage",
            Event::Ping(_) => "Ping",
            Event::Pong(_) => "Pong",
            Event::CloseConnection(_) => "CloseConnection",
        }
    }
}

impl From<crate::message::Message> for Event {
    fn from(message: crate::message::Message) -> Self {
        match message {
            crate::message::Message::Text(data) => Event::TextMessage(TextMessage {
                data,
                frame_finished: true,
                message_finished: true,
            }),
            crate::message::Message::Binary(data) => Event::BytesMessage(BytesMessage {
                data,
                frame_finished: true,
                message_finished: true,
            }),
        }
    }
}
