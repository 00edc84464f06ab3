//! Connection endpoints and the transport abstraction.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// One end of a connection: address, port and whether it speaks TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// IP address.
    pub address: IpAddr,
    /// Port number.
    pub port: u16,
    /// `true` for `wss://` endpoints.
    pub is_ssl: bool,
}

impl Endpoint {
    /// Create an endpoint.
    #[must_use]
    pub const fn new(address: IpAddr, port: u16, is_ssl: bool) -> Self {
        Self {
            address,
            port,
            is_ssl,
        }
    }

    /// Endpoint for a socket address.
    #[must_use]
    pub const fn from_socket_addr(addr: SocketAddr, is_ssl: bool) -> Self {
        Self::new(addr.ip(), addr.port(), is_ssl)
    }

    /// The socket address of this endpoint.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// URL scheme, `ws` or `wss`.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.is_ssl { "wss" } else { "ws" }
    }

    const fn is_default_port(&self) -> bool {
        (self.is_ssl && self.port == 443) || (!self.is_ssl && self.port == 80)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme())?;
        match self.address {
            IpAddr::V4(addr) => write!(f, "{addr}")?,
            IpAddr::V6(addr) => write!(f, "[{addr}]")?,
        }
        if !self.is_default_port() {
            write!(f, ":{}", self.port)?;
        }
        Ok(())
    }
}

/// A duplex byte stream a connection can run over.
///
/// Reading zero bytes means the peer closed the stream in an orderly way.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Local socket address, when the transport has one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Remote socket address, when the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// `true` when the stream is encrypted.
    fn is_secure(&self) -> bool {
        false
    }

    /// Local endpoint.
    fn local_endpoint(&self) -> Option<Endpoint> {
        self.local_addr()
            .map(|addr| Endpoint::from_socket_addr(addr, self.is_secure()))
    }

    /// Remote endpoint.
    fn remote_endpoint(&self) -> Option<Endpoint> {
        self.peer_addr()
            .map(|addr| Endpoint::from_socket_addr(addr, self.is_secure()))
    }
}

impl Transport for TcpStream {
    fn local_addr(&self) -> Option<SocketAddr> {
        TcpStream::local_addr(self).ok()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

impl Transport for DuplexStream {}

impl Transport for Box<dyn Transport> {
    fn local_addr(&self) -> Option<SocketAddr> {
        (**self).local_addr()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn is_secure(&self) -> bool {
        (**self).is_secure()
    }
}
