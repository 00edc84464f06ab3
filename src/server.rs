//! WebSocket server.
//!
//! A [`WebSocketServer`] accepts connections on one or more listeners. Each
//! connection gets its own nursery holding its reader task. Once the
//! client's handshake request arrives, the handler is called with a
//! [`WebSocketRequest`], which it accepts or rejects. When the handler
//! returns, the connection is closed.

use std::future::Future;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AcceptOptions, ServerOptions};
use crate::connection::WebSocketConnection;
use crate::endpoint::{Endpoint, Transport};
use crate::error::{Error, Result};
use crate::nursery::{Nursery, NurseryHandle};
use crate::protocol::{Headers, Request, WsProtocol};

/// A client's opening handshake, waiting for the handler's decision.
#[derive(Debug)]
pub struct WebSocketRequest {
    connection: WebSocketConnection,
    request: Request,
}

impl WebSocketRequest {
    /// Request target (path and query).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.target
    }

    /// Every header of the request, in wire order.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.request.extra_headers
    }

    /// Subprotocols offered by the client, in preference order.
    #[must_use]
    pub fn proposed_subprotocols(&self) -> &[String] {
        &self.request.subprotocols
    }

    /// Local endpoint of the connection.
    #[must_use]
    pub fn local(&self) -> Option<Endpoint> {
        self.connection.local()
    }

    /// Remote endpoint of the connection.
    #[must_use]
    pub fn remote(&self) -> Option<Endpoint> {
        self.connection.remote()
    }

    /// Accept the handshake and return the open connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a malformed header and the transport
    /// error if the response cannot be written.
    pub async fn accept(&self, options: AcceptOptions) -> Result<WebSocketConnection> {
        self.connection.accept(options).await?;
        Ok(self.connection.clone())
    }

    /// Reject the handshake with an HTTP response.
    ///
    /// A `Content-Length` header is added. The connection closes with code
    /// 1006.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for status 101 or a malformed header, and the
    /// transport error if the response cannot be written.
    pub async fn reject(
        &self,
        status_code: u16,
        extra_headers: Headers,
        body: Option<Vec<u8>>,
    ) -> Result<()> {
        self.connection
            .reject(status_code, extra_headers, body)
            .await
    }
}

/// A WebSocket server calling `handler` for every handshake request.
pub struct WebSocketServer<F> {
    handler: Arc<F>,
    listeners: Vec<TcpListener>,
    options: Arc<ServerOptions>,
}

impl<F> std::fmt::Debug for WebSocketServer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("listeners", &self.listeners())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<F> WebSocketServer<F> {
    /// Serve on already bound listeners.
    #[must_use]
    pub fn from_listeners(listeners: Vec<TcpListener>, handler: F, options: ServerOptions) -> Self {
        Self {
            handler: Arc::new(handler),
            listeners,
            options: Arc::new(options),
        }
    }

    /// Endpoints the server listens on.
    #[must_use]
    pub fn listeners(&self) -> Vec<Endpoint> {
        let is_ssl = self.is_secure();
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .map(|addr| Endpoint::from_socket_addr(addr, is_ssl))
            .collect()
    }

    /// Port of the only listener.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` unless there is exactly one listener.
    pub fn port(&self) -> Result<u16> {
        let endpoints = self.listeners();
        match endpoints.as_slice() {
            [endpoint] => Ok(endpoint.port),
            _ => Err(Error::Config(format!(
                "port() requires exactly one listener, found {}",
                endpoints.len()
            ))),
        }
    }

    #[cfg(feature = "tls-rustls")]
    fn is_secure(&self) -> bool {
        self.options.tls.is_some()
    }

    #[cfg(not(feature = "tls-rustls"))]
    fn is_secure(&self) -> bool {
        false
    }
}

impl<F, Fut> WebSocketServer<F>
where
    F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Bind one listener per address `host` resolves to. `None` binds all
    /// IPv4 interfaces.
    ///
    /// # Errors
    ///
    /// Returns the resolution or bind error, or `Error::Config` if `host`
    /// resolves to nothing.
    pub async fn bind(
        host: Option<&str>,
        port: u16,
        handler: F,
        options: ServerOptions,
    ) -> Result<Self> {
        let host = host.unwrap_or("0.0.0.0");
        let mut listeners = Vec::new();
        for addr in tokio::net::lookup_host((host, port)).await? {
            listeners.push(TcpListener::bind(addr).await?);
        }
        if listeners.is_empty() {
            return Err(Error::Config(format!("{host} resolved to no address")));
        }
        Ok(Self::from_listeners(listeners, handler, options))
    }

    /// Serve until a listener fails.
    ///
    /// # Errors
    ///
    /// See [`run_until`](Self::run_until).
    pub async fn run(self) -> Result<()> {
        self.run_until(CancellationToken::new()).await
    }

    /// Serve until `shutdown` fires. Connections still open are stopped.
    ///
    /// # Errors
    ///
    /// Returns the error of a listener that failed.
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        for endpoint in self.listeners() {
            debug!(%endpoint, "listening");
        }
        let nursery = Nursery::new();
        for listener in self.listeners {
            nursery.spawn(accept_loop(
                listener,
                Arc::clone(&self.handler),
                Arc::clone(&self.options),
                nursery.handle(),
            ));
        }

        tokio::select! {
            () = shutdown.cancelled() => nursery.shutdown(),
            () = nursery.abort_token().cancelled() => {}
        }
        let failures = nursery.join().await;
        match failures.into_iter().find(|err| !err.is_cancelled()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Bind and serve forever.
///
/// # Errors
///
/// As [`WebSocketServer::bind`] and [`WebSocketServer::run`].
pub async fn serve_websocket<F, Fut>(
    handler: F,
    host: Option<&str>,
    port: u16,
    options: ServerOptions,
) -> Result<()>
where
    F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    WebSocketServer::bind(host, port, handler, options)
        .await?
        .run()
        .await
}

async fn accept_loop<F, Fut>(
    listener: TcpListener,
    handler: Arc<F>,
    options: Arc<ServerOptions>,
    nursery: NurseryHandle,
) -> Result<()>
where
    F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) if is_transient(&err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        debug!(%peer, "accepted connection");
        let handler = Arc::clone(&handler);
        let options = Arc::clone(&options);
        nursery.spawn(async move {
            handle_connection(stream, handler, options).await;
            Ok(())
        });
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}

async fn handle_connection<F, Fut>(stream: TcpStream, handler: Arc<F>, options: Arc<ServerOptions>)
where
    F: Fn(WebSocketRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "failed to set TCP_NODELAY");
    }
    let transport = match wrap_transport(stream, &options).await {
        Ok(transport) => transport,
        Err(err) => {
            debug!(error = %err, "TLS handshake failed");
            return;
        }
    };

    let nursery = Nursery::new();
    let connection = WebSocketConnection::new(
        transport,
        WsProtocol::server(),
        options.connection.clone(),
        None,
    );
    if let Err(err) = connection.start(&nursery) {
        warn!(connection = %connection, error = %err, "failed to start reader task");
        return;
    }

    let request = match tokio::time::timeout(options.connect_timeout, connection.wait_request()).await
    {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!(connection = %connection, "connection closed before handshake request");
            nursery.cancel();
            nursery.join().await;
            return;
        }
        Err(_) => {
            debug!(connection = %connection, "handshake request timed out");
            nursery.cancel();
            nursery.join().await;
            return;
        }
    };
    debug!(connection = %connection, path = %request.target, "handshake request");

    let ws_request = WebSocketRequest {
        connection: connection.clone(),
        request,
    };
    let outcome = tokio::select! {
        result = handler(ws_request) => result,
        () = nursery.abort_token().cancelled() => Err(Error::Cancelled),
    };
    if let Err(err) = outcome {
        warn!(connection = %connection, error = %err, "websocket handler failed");
    }

    match tokio::time::timeout(options.disconnect_timeout, connection.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(connection = %connection, error = %err, "close failed"),
        Err(_) => debug!(connection = %connection, "disconnect timed out"),
    }
    nursery.shutdown();
    for failure in nursery.join().await {
        if !failure.is_cancelled() {
            debug!(connection = %connection, error = %failure, "reader task failed");
        }
    }
}

async fn wrap_transport(stream: TcpStream, options: &ServerOptions) -> Result<Box<dyn Transport>> {
    #[cfg(feature = "tls-rustls")]
    if let Some(config) = &options.tls {
        let accept = crate::tls::accept(Arc::clone(config), stream);
        return match tokio::time::timeout(options.connect_timeout, accept).await {
            Ok(stream) => Ok(Box::new(stream?)),
            Err(_) => Err(Error::ConnectionTimeout),
        };
    }
    #[cfg(not(feature = "tls-rustls"))]
    let _ = options;
    Ok(Box::new(stream))
}
