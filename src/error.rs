//! Error types for WebSocket connections.
//!
//! Errors fall into three groups: handshake-phase failures (`Handshake`,
//! `ConnectionTimeout`, `DisconnectionTimeout`, `ConnectionRejected`),
//! steady-state closure (`ConnectionClosed`) and programmer errors
//! (`PingInFlight`, `WrongRole`). The remaining variants carry transport,
//! protocol and task-group outcomes.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::connection::Role;
use crate::message::CloseReason;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The opening handshake failed (transport or protocol error).
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// The opening handshake did not finish within the connect timeout.
    #[error("Timed out while opening the WebSocket connection")]
    ConnectionTimeout,

    /// The closing handshake did not finish within the disconnect timeout.
    #[error("Timed out while closing the WebSocket connection")]
    DisconnectionTimeout,

    /// The server answered the opening handshake with a non-101 response.
    #[error("{0}")]
    ConnectionRejected(Rejection),

    /// The connection is closed or closing.
    #[error("Connection closed: {0}")]
    ConnectionClosed(CloseReason),

    /// A ping with this payload is already waiting for its pong.
    #[error("Ping payload already in flight: {0:02x?}")]
    PingInFlight(Vec<u8>),

    /// The operation is only valid for the other connection role.
    #[error("Operation requires a {expected} connection")]
    WrongRole {
        /// Role the operation is valid for.
        expected: Role,
    },

    /// The protocol engine rejected incoming or outgoing data.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Invalid URL or option.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// TLS setup failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The task was cancelled because a sibling task failed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The task was interrupted by the user (e.g. Ctrl-C).
    #[error("Interrupted")]
    Interrupted,

    /// An error raised by application code.
    #[error("{0}")]
    Application(Arc<dyn StdError + Send + Sync>),

    /// An error with the errors of concurrently failing tasks attached.
    #[error("{error} (+{n} related errors)", n = .context.len())]
    Context {
        /// The error that is reported to the caller.
        #[source]
        error: Box<Error>,
        /// Errors raised concurrently that led to or accompanied `error`.
        context: Vec<Error>,
    },

    /// A library invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an application error.
    pub fn application<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Application(Arc::new(err))
    }

    /// Returns `true` for failures of the opening or closing handshake.
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self.primary(),
            Error::Handshake(_) | Error::ConnectionTimeout | Error::DisconnectionTimeout
        )
    }

    /// Returns `true` if this is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` if this is a user interrupt.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }

    /// The close reason, if this error reports a closed connection.
    #[must_use]
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self.primary() {
            Error::ConnectionClosed(reason) => Some(reason),
            _ => None,
        }
    }

    /// The error reported to the caller, looking through attached context.
    #[must_use]
    pub fn primary(&self) -> &Error {
        match self {
            Error::Context { error, .. } => error.primary(),
            other => other,
        }
    }

    /// Errors attached as context, outermost first.
    #[must_use]
    pub fn context(&self) -> &[Error] {
        match self {
            Error::Context { context, .. } => context,
            _ => &[],
        }
    }

    /// Attach `context` to this error. Context already attached is kept.
    #[must_use]
    pub fn with_context(self, mut context: Vec<Error>) -> Self {
        if context.is_empty() {
            return self;
        }
        match self {
            Error::Context {
                error,
                context: prior,
            } => {
                context.extend(prior);
                Error::Context { error, context }
            }
            other => Error::Context {
                error: Box::new(other),
                context,
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::Protocol("Invalid UTF-8 in text message".into())
    }
}

impl From<::url::ParseError> for Error {
    fn from(err: ::url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {err}"))
    }
}

/// A non-101 response to the opening handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body, if the server sent one.
    pub body: Option<Vec<u8>>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection rejected with status {}", self.status_code)?;
        if let Some(body) = &self.body {
            write!(f, ": {}", String::from_utf8_lossy(body))?;
        }
        Ok(())
    }
}
