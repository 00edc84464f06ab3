//! Opening client connections.
//!
//! [`connect_websocket`] is the low-level primitive: it connects, starts the
//! reader task on a caller-provided nursery and returns once the opening
//! handshake completed. [`open_websocket`] is the scoped helper: it owns the
//! nursery, enforces the connect and disconnect timeouts, runs a body with
//! the connection and always closes it afterwards.

mod unify;

pub use unify::{Failure, unify};

use std::future::Future;

use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConnectOptions;
use crate::connection::WebSocketConnection;
use crate::endpoint::Transport;
use crate::error::{Error, Result};
use crate::nursery::{Nursery, NurseryHandle};
use crate::protocol::{Request, WsProtocol};
use crate::url::WsUrl;

/// Connect to a WebSocket server.
///
/// The reader task runs on `nursery`; the connection lives as long as it.
///
/// # Errors
///
/// Transport errors are returned as they are. A non-101 response is
/// `Error::ConnectionRejected`; a connection that ends before the handshake
/// completes is `Error::Handshake`.
pub async fn connect_websocket(
    nursery: &NurseryHandle,
    host: &str,
    port: u16,
    resource: &str,
    use_ssl: bool,
    options: &ConnectOptions,
) -> Result<WebSocketConnection> {
    let transport = open_transport(host, port, use_ssl, options).await?;
    let request = Request {
        host: host_header(host, port, use_ssl),
        target: resource.to_owned(),
        subprotocols: options.subprotocols.clone(),
        extensions: Vec::new(),
        extra_headers: options.extra_headers.clone(),
    };
    let connection = WebSocketConnection::new(
        transport,
        WsProtocol::client(),
        options.connection.clone(),
        Some(request),
    );
    connection.start(nursery)?;
    connection.wait_open().await?;
    debug!(
        connection = %connection,
        host,
        port,
        resource,
        subprotocol = ?connection.subprotocol(),
        "connected"
    );
    Ok(connection)
}

/// [`connect_websocket`] for a `ws://` or `wss://` URL.
///
/// # Errors
///
/// Returns `Error::Config` for an invalid URL, otherwise as
/// [`connect_websocket`].
pub async fn connect_websocket_url(
    nursery: &NurseryHandle,
    url: &str,
    options: &ConnectOptions,
) -> Result<WebSocketConnection> {
    let url = WsUrl::parse(url)?;
    connect_websocket(
        nursery,
        &url.host,
        url.port,
        &url.resource,
        url.use_ssl,
        options,
    )
    .await
}

/// Connect, run `body` with the connection, then close it.
///
/// The connect phase is bounded by `connect_timeout` and the close by
/// `disconnect_timeout`. Failures of the body, the reader task and the
/// close are combined by [`unify`]: a body error is reported with the
/// library's concurrent failures attached as context.
///
/// ```rust,ignore
/// let reply = open_websocket("localhost", 8000, "/", false, &options, |ws| async move {
///     ws.send_message("hello").await?;
///     ws.get_message().await
/// })
/// .await?;
/// ```
///
/// # Errors
///
/// `Error::ConnectionTimeout` or `Error::DisconnectionTimeout` when a phase
/// times out, `Error::Handshake` when connecting fails, and
/// `Error::ConnectionRejected` when the server rejects the handshake.
pub async fn open_websocket<F, Fut, T>(
    host: &str,
    port: u16,
    resource: &str,
    use_ssl: bool,
    options: &ConnectOptions,
    body: F,
) -> Result<T>
where
    F: FnOnce(WebSocketConnection) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let nursery = Nursery::new();

    let connected = tokio::time::timeout(
        options.connect_timeout,
        connect_websocket(&nursery, host, port, resource, use_ssl, options),
    )
    .await;
    let connection = match connected {
        Ok(Ok(connection)) => connection,
        Ok(Err(err)) => {
            abandon(nursery).await;
            return Err(as_handshake_error(err));
        }
        Err(_) => {
            debug!(host, port, timeout = ?options.connect_timeout, "connect timed out");
            abandon(nursery).await;
            return Err(Error::ConnectionTimeout);
        }
    };
    let _guard = connection.close_guard();

    let outcome = tokio::select! {
        result = body(connection.clone()) => result,
        () = nursery.abort_token().cancelled() => Err(Error::Cancelled),
    };

    let closed = match tokio::time::timeout(options.disconnect_timeout, connection.close()).await
    {
        Ok(result) => result,
        Err(_) => {
            debug!(connection = %connection, "disconnect timed out");
            Err(Error::DisconnectionTimeout)
        }
    };

    nursery.shutdown();
    let internal = nursery.join().await;

    let mut failures = Vec::new();
    let value = match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            // The reader ends quietly on an abnormal closure; report it next
            // to the body's error unless the body already returned it.
            let abnormal = connection
                .abnormal_closure()
                .filter(|abnormal| abnormal.close_reason() != err.close_reason());
            failures.push(Failure::User(err));
            failures.extend(abnormal.map(Failure::Internal));
            None
        }
    };
    if let Err(err) = closed {
        failures.push(Failure::Internal(err));
    }
    failures.extend(internal.into_iter().map(Failure::Internal));

    match (unify(failures), value) {
        (Some(err), _) => Err(err),
        (None, Some(value)) => Ok(value),
        (None, None) => Err(Error::Internal("body produced neither a value nor an error".into())),
    }
}

/// [`open_websocket`] for a `ws://` or `wss://` URL.
///
/// # Errors
///
/// Returns `Error::Config` for an invalid URL, otherwise as
/// [`open_websocket`].
pub async fn open_websocket_url<F, Fut, T>(url: &str, options: &ConnectOptions, body: F) -> Result<T>
where
    F: FnOnce(WebSocketConnection) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let url = WsUrl::parse(url)?;
    open_websocket(
        &url.host,
        url.port,
        &url.resource,
        url.use_ssl,
        options,
        body,
    )
    .await
}

async fn abandon(nursery: Nursery) {
    nursery.cancel();
    for failure in nursery.join().await {
        if !failure.is_cancelled() {
            debug!(error = %failure, "connect failure in reader task");
        }
    }
}

fn as_handshake_error(err: Error) -> Error {
    match err {
        Error::ConnectionRejected(_) | Error::Handshake(_) | Error::ConnectionTimeout => err,
        other => Error::Handshake(other.to_string()),
    }
}

/// Value of the `Host` header: the port is left out when it is the default.
fn host_header(host: &str, port: u16, use_ssl: bool) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    match (use_ssl, port) {
        (false, 80) | (true, 443) => host,
        _ => format!("{host}:{port}"),
    }
}

async fn open_transport(
    host: &str,
    port: u16,
    use_ssl: bool,
    options: &ConnectOptions,
) -> Result<Box<dyn Transport>> {
    let tcp = TcpStream::connect((host, port)).await?;
    if let Err(err) = tcp.set_nodelay(true) {
        debug!(error = %err, "failed to set TCP_NODELAY");
    }
    if !use_ssl {
        return Ok(Box::new(tcp));
    }

    #[cfg(feature = "tls-rustls")]
    {
        let config = match &options.tls {
            Some(config) => config.clone(),
            None => crate::tls::client_config_with_native_roots(),
        };
        let stream = crate::tls::connect(config, host, tcp).await?;
        Ok(Box::new(stream))
    }

    #[cfg(not(feature = "tls-rustls"))]
    {
        let _ = options;
        Err(Error::Tls(
            "wss:// requires the `tls-rustls` feature".into(),
        ))
    }
}
