//! Test servers on random loopback ports.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wsnursery::{AcceptOptions, Error, Result, ServerOptions, WebSocketRequest, WebSocketServer};

use super::RawPeer;

/// A `WebSocketServer` running in the background.
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl TestServer {
    /// Serve `handler` with default options.
    pub async fn spawn<F, Fut>(handler: F) -> Self
    where
        F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::spawn_with(handler, ServerOptions::default()).await
    }

    /// Serve `handler` with `options`.
    pub async fn spawn_with<F, Fut>(handler: F, options: ServerOptions) -> Self
    where
        F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = WebSocketServer::from_listeners(vec![listener], handler, options);
        assert_eq!(server.port().unwrap(), addr.port());

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.run_until(shutdown.clone()));
        Self {
            addr,
            shutdown,
            task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Stop the server and return how it ended.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task.await.unwrap()
    }
}

/// Accept every request and echo messages until the client closes.
pub async fn echo(request: WebSocketRequest) -> Result<()> {
    let ws = request.accept(AcceptOptions::default()).await?;
    loop {
        let message = match ws.get_message().await {
            Ok(message) => message,
            Err(Error::ConnectionClosed(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        ws.send_message(message).await?;
    }
}

/// A listener whose peers complete the opening handshake by hand.
pub struct RawServer {
    listener: TcpListener,
}

impl RawServer {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Accept a connection without reading anything.
    pub async fn accept_silent(&self) -> RawPeer {
        let (stream, _) = self.listener.accept().await.unwrap();
        RawPeer::from_stream(stream)
    }

    /// Accept a connection and answer its opening handshake with 101.
    pub async fn accept(&self) -> RawPeer {
        let mut peer = self.accept_silent().await;
        let head = peer.read_head().await;
        let key = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_owned())
            })
            .expect("request carries a key");
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            wsnursery::compute_accept_key(&key)
        );
        peer.write(response.as_bytes()).await;
        peer
    }
}
