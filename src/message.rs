//! WebSocket messages, close codes and close reasons as defined in RFC 6455.

use std::fmt;

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000). The connection successfully completed.
    #[default]
    Normal,
    /// Going away (1001). Endpoint is going away (e.g., server shutdown, browser navigating away).
    GoingAway,
    /// Protocol error (1002). Endpoint received a malformed frame or protocol violation.
    ProtocolError,
    /// Unsupported data (1003). Endpoint received data type it cannot handle.
    UnsupportedData,
    /// No status received (1005). Reported locally when a close frame had no code.
    NoStatusReceived,
    /// Abnormal closure (1006). Reported locally when the transport vanished without a close frame.
    Abnormal,
    /// Invalid payload (1007). Endpoint received a message with invalid data (e.g., non-UTF-8 in text).
    InvalidPayload,
    /// Policy violation (1008). Endpoint received a message that violates its policy.
    PolicyViolation,
    /// Message too big (1009). Endpoint received a message too large to process.
    MessageTooBig,
    /// Mandatory extension (1010). Client expected server to negotiate an extension.
    MandatoryExtension,
    /// Internal error (1011). Server encountered an unexpected condition.
    InternalError,
    /// Service restart (1012).
    ServiceRestart,
    /// Try again later (1013).
    TryAgainLater,
    /// TLS handshake failure (1015). Reported locally, never sent.
    TlsHandshake,
    /// Any other close code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            1012 => CloseCode::ServiceRestart,
            1013 => CloseCode::TryAgainLater,
            1015 => CloseCode::TlsHandshake,
            other => CloseCode::Other(other),
        }
    }

    /// Get the numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Other(code) => *code,
        }
    }

    /// Symbolic name of the code.
    ///
    /// Well-known codes have their registered name; other codes are named
    /// after the range they fall in.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            CloseCode::Normal => "NORMAL_CLOSURE",
            CloseCode::GoingAway => "GOING_AWAY",
            CloseCode::ProtocolError => "PROTOCOL_ERROR",
            CloseCode::UnsupportedData => "UNSUPPORTED_DATA",
            CloseCode::NoStatusReceived => "NO_STATUS_RCVD",
            CloseCode::Abnormal => "ABNORMAL_CLOSURE",
            CloseCode::InvalidPayload => "INVALID_FRAME_PAYLOAD_DATA",
            CloseCode::PolicyViolation => "POLICY_VIOLATION",
            CloseCode::MessageTooBig => "MESSAGE_TOO_BIG",
            CloseCode::MandatoryExtension => "MANDATORY_EXT",
            CloseCode::InternalError => "INTERNAL_ERROR",
            CloseCode::ServiceRestart => "SERVICE_RESTART",
            CloseCode::TryAgainLater => "TRY_AGAIN_LATER",
            CloseCode::TlsHandshake => "TLS_HANDSHAKE_FAILED",
            CloseCode::Other(code) => match *code {
                1000..=2999 => "RFC_RESERVED",
                3000..=3999 => "IANA_RESERVED",
                4000..=4999 => "PRIVATE_RESERVED",
                _ => "INVALID_CODE",
            },
        }
    }

    /// Check if this close code may be sent in a Close frame (RFC 6455 Section 7.4.1).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        let code = self.as_u16();
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Check if this close code is reserved and MUST NOT be sent in a Close frame.
    ///
    /// - 1004: Reserved
    /// - 1005: No Status Received
    /// - 1006: Abnormal Closure
    /// - 1015: TLS Handshake
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        let code = self.as_u16();
        matches!(code, 1004..=1006 | 1015)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode::from_u16(code)
    }
}

/// Why a connection closed: the negotiated code plus an optional free-text reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    code: u16,
    reason: Option<String>,
}

impl CloseReason {
    /// Create a close reason.
    #[must_use]
    pub fn new(code: u16, reason: Option<String>) -> Self {
        Self { code, reason }
    }

    /// Numeric close code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Symbolic name derived from the code.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        CloseCode::from_u16(self.code).name()
    }

    /// Free-text reason sent by the closing side.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.name())?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// A complete WebSocket data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message (arbitrary bytes).
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Returns `true` if this is a text message.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume and return the text content, if this is a text message.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Consume and return the binary content, if this is a binary message.
    #[must_use]
    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Message::Binary(data) => Some(data),
            Message::Text(_) => None,
        }
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Borrow the binary content, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Message::Binary(data) => Some(data),
            Message::Text(_) => None,
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        assert!(matches!(Message::text("hello"), Message::Text(s) if s == "hello"));
        assert!(matches!(Message::binary([4, 5, 6]), Message::Binary(ref d) if d == &[4, 5, 6]));
        assert_eq!(Message::from("x"), Message::text("x"));
        assert_eq!(Message::from(vec![1u8]), Message::binary(vec![1]));
    }

    #[test]
    fn test_message_accessors() {
        let msg = Message::text("hello");
        assert!(msg.is_text());
        assert_eq!(msg.len(), 5);
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.as_binary(), None);
        assert_eq!(msg.into_text(), Some(String::from("hello")));

        let msg = Message::binary(vec![1, 2, 3]);
        assert!(msg.is_binary());
        assert!(!msg.is_empty());
        assert_eq!(msg.as_binary(), Some([1, 2, 3].as_slice()));
        assert_eq!(msg.into_binary(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_close_code_roundtrip_well_known() {
        for code in [1000, 1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010, 1011, 1012, 1013, 1015] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
            assert!(!matches!(CloseCode::from_u16(code), CloseCode::Other(_)));
        }
        assert_eq!(CloseCode::from_u16(3000), CloseCode::Other(3000));
    }

    #[test]
    fn test_close_code_names_by_range() {
        assert_eq!(CloseCode::Normal.name(), "NORMAL_CLOSURE");
        assert_eq!(CloseCode::Abnormal.name(), "ABNORMAL_CLOSURE");
        assert_eq!(CloseCode::Other(1004).name(), "RFC_RESERVED");
        assert_eq!(CloseCode::Other(2999).name(), "RFC_RESERVED");
        assert_eq!(CloseCode::Other(3000).name(), "IANA_RESERVED");
        assert_eq!(CloseCode::Other(4000).name(), "PRIVATE_RESERVED");
        assert_eq!(CloseCode::Other(4999).name(), "PRIVATE_RESERVED");
        assert_eq!(CloseCode::Other(999).name(), "INVALID_CODE");
        assert_eq!(CloseCode::Other(5000).name(), "INVALID_CODE");
    }

    #[test]
    fn test_close_code_validity() {
        assert!(CloseCode::Normal.is_valid());
        assert!(CloseCode::MessageTooBig.is_valid());
        assert!(CloseCode::Other(1014).is_valid());
        assert!(CloseCode::Other(4999).is_valid());

        assert!(!CloseCode::Other(999).is_valid());
        assert!(!CloseCode::Abnormal.is_valid());
        assert!(!CloseCode::NoStatusReceived.is_valid());
        assert!(!CloseCode::TlsHandshake.is_valid());
        assert!(!CloseCode::Other(5000).is_valid());
    }

    #[test]
    fn test_close_code_reserved() {
        assert!(CloseCode::Other(1004).is_reserved());
        assert!(CloseCode::NoStatusReceived.is_reserved());
        assert!(CloseCode::Abnormal.is_reserved());
        assert!(CloseCode::TlsHandshake.is_reserved());
        assert!(!CloseCode::Normal.is_reserved());
        assert!(!CloseCode::Other(3000).is_reserved());
    }

    #[test]
    fn test_close_reason() {
        let reason = CloseReason::new(1000, None);
        assert_eq!(reason.code(), 1000);
        assert_eq!(reason.name(), "NORMAL_CLOSURE");
        assert_eq!(reason.reason(), None);
        assert_eq!(reason.to_string(), "1000 (NORMAL_CLOSURE)");

        let reason = CloseReason::new(4001, Some("bye".into()));
        assert_eq!(reason.name(), "PRIVATE_RESERVED");
        assert_eq!(reason.to_string(), "4001 (PRIVATE_RESERVED): bye");
    }
}
