//! Configuration for connections, clients and servers.

use std::time::Duration;

#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

use crate::protocol::Headers;

/// Default capacity of the received-message queue.
pub const DEFAULT_MESSAGE_QUEUE_SIZE: usize = 1;

/// Default maximum message size: 1 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default transport read size.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;

/// Default connect and disconnect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Number of complete messages buffered before the reader task stops
    /// reading from the transport.
    ///
    /// Default: 1
    pub message_queue_size: usize,

    /// Maximum size of a reassembled message in bytes. Larger messages close
    /// the connection with code 1009.
    ///
    /// Default: 1 MiB
    pub max_message_size: usize,

    /// Maximum bytes read from the transport at once. `None` uses the
    /// default.
    ///
    /// Default: `Some(4096)`
    pub receive_buffer_size: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            message_queue_size: DEFAULT_MESSAGE_QUEUE_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            receive_buffer_size: Some(DEFAULT_RECEIVE_BUFFER_SIZE),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the received-message queue capacity (at least 1).
    #[must_use]
    pub const fn with_message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = if size == 0 { 1 } else { size };
        self
    }

    /// Set the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the transport read size.
    #[must_use]
    pub const fn with_receive_buffer_size(mut self, size: Option<usize>) -> Self {
        self.receive_buffer_size = size;
        self
    }

    /// Effective read size.
    #[must_use]
    pub fn read_size(&self) -> usize {
        self.receive_buffer_size
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_RECEIVE_BUFFER_SIZE)
    }
}

/// Options for opening a client connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Connection limits.
    pub connection: ConnectionConfig,

    /// Subprotocols offered to the server, in preference order.
    pub subprotocols: Vec<String>,

    /// Extra headers sent with the handshake request.
    pub extra_headers: Headers,

    /// Time allowed for TCP connect, TLS and the opening handshake.
    ///
    /// Default: 60 seconds
    pub connect_timeout: Duration,

    /// Time allowed for the closing handshake.
    ///
    /// Default: 60 seconds
    pub disconnect_timeout: Duration,

    /// TLS configuration for `wss://`. `None` uses the webpki root store.
    #[cfg(feature = "tls-rustls")]
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            subprotocols: Vec::new(),
            extra_headers: Vec::new(),
            connect_timeout: DEFAULT_TIMEOUT,
            disconnect_timeout: DEFAULT_TIMEOUT,
            #[cfg(feature = "tls-rustls")]
            tls: None,
        }
    }
}

impl ConnectOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection limits.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set offered subprotocols.
    #[must_use]
    pub fn with_subprotocols<I, S>(mut self, subprotocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = subprotocols.into_iter().map(Into::into).collect();
        self
    }

    /// Add a handshake request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the disconnect timeout.
    #[must_use]
    pub const fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Set the rustls client configuration used for `wss://`.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }
}

/// Options for a WebSocket server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Limits applied to every accepted connection.
    pub connection: ConnectionConfig,

    /// Time allowed for the client's handshake request to arrive.
    ///
    /// Default: 60 seconds
    pub connect_timeout: Duration,

    /// Time allowed for the closing handshake after the handler returns.
    ///
    /// Default: 60 seconds
    pub disconnect_timeout: Duration,

    /// Accept TLS on every listener when set.
    #[cfg(feature = "tls-rustls")]
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            connect_timeout: DEFAULT_TIMEOUT,
            disconnect_timeout: DEFAULT_TIMEOUT,
            #[cfg(feature = "tls-rustls")]
            tls: None,
        }
    }
}

impl ServerOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set per-connection limits.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the disconnect timeout.
    #[must_use]
    pub const fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Serve `wss://` with this rustls configuration.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }
}

/// How a server accepts a handshake request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptOptions {
    /// Selected subprotocol, normally one of the client's proposals.
    pub subprotocol: Option<String>,

    /// Extra response headers.
    pub extra_headers: Headers,
}

impl AcceptOptions {
    /// Accept without a subprotocol or extra headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a subprotocol.
    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = Some(subprotocol.into());
        self
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}
