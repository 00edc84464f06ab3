//! A byte-level peer for tests that need to break the protocol.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::TEST_TIMEOUT;

/// One end of a TCP connection, driven byte by byte.
pub struct RawPeer {
    stream: TcpStream,
}

impl RawPeer {
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> Self {
        Self::from_stream(TcpStream::connect(addr).await.unwrap())
    }

    /// Connect and complete a valid opening handshake for `path`.
    pub async fn connect_ws(addr: SocketAddr, path: &str) -> Self {
        let mut peer = Self::connect(addr).await;
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );
        peer.write(request.as_bytes()).await;
        let head = peer.read_head().await;
        assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");
        assert!(head.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
        peer
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Read an HTTP head up to and including the blank line.
    pub async fn read_head(&mut self) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            let n = tokio::time::timeout(TEST_TIMEOUT, self.stream.read(&mut byte))
                .await
                .expect("head arrives in time")
                .unwrap();
            assert_eq!(n, 1, "connection closed inside the head");
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    pub async fn read_exact(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(TEST_TIMEOUT, self.stream.read_exact(&mut buf))
            .await
            .expect("bytes arrive in time")
            .unwrap();
        buf
    }

    /// Everything until the peer closes. A reset counts as the end.
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        let read = tokio::time::timeout(TEST_TIMEOUT, self.stream.read_to_end(&mut buf))
            .await
            .expect("peer closes in time");
        if let Err(err) = read {
            assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset, "{err}");
        }
        buf
    }
}
