use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{AcceptOptions, ConnectionConfig};
use crate::connection::Role;
use crate::connection::latch::Latch;
use crate::connection::pings::PingRegistry;
use crate::endpoint::{Endpoint, Transport};
use crate::error::{Error, Rejection, Result};
use crate::message::{CloseCode, CloseReason, Message};
use crate::nursery::NurseryHandle;
use crate::protocol::{
    AcceptConnection, CloseConnection, Event, Headers, Ping, Pong, ProtocolEngine, ProtocolState,
    RejectConnection, RejectData, Request,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

type Stream = Box<dyn Transport>;

/// A WebSocket connection.
///
/// The connection is driven by a reader task (see [`start`](Self::start))
/// that reads from the transport, feeds the protocol engine and dispatches
/// the resulting events. Every other method can be called from any task,
/// concurrently. Clones share the same connection.
///
/// ```rust,ignore
/// let ws = connect_websocket(&nursery, "localhost", 8000, "/", false, &options).await?;
/// ws.send_message("hello").await?;
/// let reply = ws.get_message().await?;
/// ws.aclose(1000, None).await?;
/// ```
#[derive(Clone)]
pub struct WebSocketConnection {
    shared: Arc<Shared>,
}

struct Shared {
    id: u64,
    role: Role,
    config: ConnectionConfig,
    local: Option<Endpoint>,
    remote: Option<Endpoint>,
    engine: Mutex<Box<dyn ProtocolEngine>>,
    /// Send lock. Holds the write half until the transport is closed.
    writer: tokio::sync::Mutex<Option<WriteHalf<Stream>>>,
    state: Mutex<State>,
    reader: Mutex<Option<ReaderParts>>,
    messages_tx: Mutex<Option<mpsc::Sender<Message>>>,
    messages_rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    request_received: Latch,
    open: Latch,
    closed: Latch,
    recv_closed: Latch,
    stream_closed: Latch,
}

#[derive(Default)]
struct State {
    close_reason: Option<CloseReason>,
    pings: PingRegistry,
    path: String,
    subprotocol: Option<String>,
    handshake_headers: Headers,
    request: Option<Request>,
    pending_rejection: Option<Rejection>,
    rejection: Option<Rejection>,
    failure: Option<Error>,
}

struct ReaderParts {
    stream: ReadHalf<Stream>,
    request: Option<Request>,
}

#[derive(Default)]
struct Assembly {
    text: String,
    binary: Vec<u8>,
    size: usize,
}

enum Flow {
    Continue,
    Stop,
}

impl WebSocketConnection {
    /// Wrap a transport and a protocol engine.
    ///
    /// The role comes from the engine. A client connection sends `request`
    /// as the first thing its reader task does. Nothing happens until
    /// [`start`](Self::start) is called.
    pub fn new<T, E>(
        transport: T,
        engine: E,
        config: ConnectionConfig,
        request: Option<Request>,
    ) -> Self
    where
        T: Transport,
        E: ProtocolEngine + 'static,
    {
        let role = if engine.is_client() {
            Role::Client
        } else {
            Role::Server
        };
        let local = transport.local_endpoint();
        let remote = transport.remote_endpoint();
        let stream: Stream = Box::new(transport);
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(config.message_queue_size.max(1));

        let state = State {
            path: request
                .as_ref()
                .map(|r| r.target.clone())
                .unwrap_or_default(),
            ..State::default()
        };

        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                role,
                config,
                local,
                remote,
                engine: Mutex::new(Box::new(engine)),
                writer: tokio::sync::Mutex::new(Some(write_half)),
                state: Mutex::new(state),
                reader: Mutex::new(Some(ReaderParts {
                    stream: read_half,
                    request,
                })),
                messages_tx: Mutex::new(Some(tx)),
                messages_rx: tokio::sync::Mutex::new(rx),
                request_received: Latch::new(),
                open: Latch::new(),
                closed: Latch::new(),
                recv_closed: Latch::new(),
                stream_closed: Latch::new(),
            }),
        }
    }

    /// Spawn the reader task on `nursery`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the reader task was already started.
    pub fn start(&self, nursery: &NurseryHandle) -> Result<()> {
        let parts = lock(&self.shared.reader)
            .take()
            .ok_or_else(|| Error::Internal("reader task already started".into()))?;
        nursery.spawn(self.clone().run_reader(parts));
        Ok(())
    }

    /// Process-unique connection number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Client or server.
    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// `true` for client connections.
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.shared.role == Role::Client
    }

    /// `true` for server connections.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.shared.role == Role::Server
    }

    /// Local endpoint, if the transport has socket addresses.
    #[must_use]
    pub fn local(&self) -> Option<Endpoint> {
        self.shared.local
    }

    /// Remote endpoint, if the transport has socket addresses.
    #[must_use]
    pub fn remote(&self) -> Option<Endpoint> {
        self.shared.remote
    }

    /// Request target of the opening handshake.
    #[must_use]
    pub fn path(&self) -> String {
        self.state().path.clone()
    }

    /// Negotiated subprotocol.
    #[must_use]
    pub fn subprotocol(&self) -> Option<String> {
        self.state().subprotocol.clone()
    }

    /// Headers of the opening handshake: the response on a client, the
    /// request on a server.
    #[must_use]
    pub fn handshake_headers(&self) -> Headers {
        self.state().handshake_headers.clone()
    }

    /// The close reason. `None` while the connection is open.
    #[must_use]
    pub fn closed(&self) -> Option<CloseReason> {
        self.state().close_reason.clone()
    }

    /// Current protocol state.
    #[must_use]
    pub fn protocol_state(&self) -> ProtocolState {
        self.engine().state()
    }

    /// Connection limits.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Receive the next complete message.
    ///
    /// Messages that arrived before the peer closed the connection are
    /// returned before the close is reported.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` once the connection is closed and
    /// no buffered message is left, or right away after a local close.
    pub async fn get_message(&self) -> Result<Message> {
        if self.shared.recv_closed.is_set() {
            return Err(self.closed_error());
        }
        let mut rx = self.shared.messages_rx.lock().await;
        tokio::select! {
            biased;
            () = self.shared.recv_closed.wait() => Err(self.closed_error()),
            message = rx.recv() => message.ok_or_else(|| self.closed_error()),
        }
    }

    /// Send a text or binary message.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the connection is closed or
    /// closing, or the transport error if the write fails.
    pub async fn send_message(&self, message: impl Into<Message>) -> Result<()> {
        self.check_open()?;
        self.send_event(Event::from(message.into())).await
    }

    /// Send a ping and wait for the matching pong.
    ///
    /// Without a payload, four random bytes are used. A pong also answers
    /// every ping sent before the one it matches.
    ///
    /// # Errors
    ///
    /// Returns `Error::PingInFlight` if a ping with the same payload is
    /// still waiting, and `Error::ConnectionClosed` if the connection is or
    /// becomes closed before the pong arrives.
    pub async fn ping(&self, payload: Option<Vec<u8>>) -> Result<()> {
        let payload = match payload {
            Some(payload) => payload,
            None => random_payload()?,
        };
        self.check_open()?;
        let waiter = self.state().pings.register(payload.clone())?;

        if let Err(err) = self
            .send_event(Event::Ping(Ping {
                payload: payload.clone(),
            }))
            .await
        {
            self.state().pings.remove(&payload);
            return Err(err);
        }
        waiter.await.map_err(|_| self.closed_error())
    }

    /// Send an unsolicited pong.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed` if the connection is closed.
    pub async fn pong(&self, payload: Vec<u8>) -> Result<()> {
        self.check_open()?;
        self.send_event(Event::Pong(Pong { payload })).await
    }

    /// Close with code 1000 and no reason.
    ///
    /// # Errors
    ///
    /// See [`aclose`](Self::aclose).
    pub async fn close(&self) -> Result<()> {
        self.aclose(CloseCode::Normal.as_u16(), None).await
    }

    /// Close the connection and wait for the closing handshake.
    ///
    /// Calling it again, or after the peer closed, succeeds without sending
    /// anything. The transport is closed afterwards in every case, also when
    /// this future is dropped before it completes.
    ///
    /// # Errors
    ///
    /// Returns the transport error if closing the transport fails.
    pub async fn aclose(&self, code: u16, reason: Option<String>) -> Result<()> {
        let guard = self.close_guard();
        let result = self.close_handshake(code, reason).await;
        let closed = self.close_stream().await;
        guard.disarm();
        result.and(closed)
    }

    async fn close_handshake(&self, code: u16, reason: Option<String>) -> Result<()> {
        if self.closed().is_some() {
            return Ok(());
        }
        match self.protocol_state() {
            ProtocolState::Open => {
                self.set_close_reason_if_unset(CloseReason::new(CloseCode::Normal.as_u16(), None));
                self.close_receive_side();
                let close = Event::CloseConnection(CloseConnection { code, reason });
                if let Err(err) = self.send_event(close).await {
                    debug!(connection = %self, error = %err, "failed to send close frame");
                }
                tokio::select! {
                    () = self.shared.closed.wait() => {}
                    () = self.shared.stream_closed.wait() => {}
                }
            }
            ProtocolState::Connecting | ProtocolState::Rejecting => {
                self.set_close_reason_if_unset(CloseReason::new(CloseCode::Abnormal.as_u16(), None));
                self.shared.closed.set();
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) async fn wait_open(&self) -> Result<()> {
        tokio::select! {
            biased;
            () = self.shared.open.wait() => Ok(()),
            () = self.shared.closed.wait() => Err(self.handshake_failure()),
            () = self.shared.stream_closed.wait() => Err(self.handshake_failure()),
        }
    }

    /// Wait for the client's handshake request. `None` if the transport
    /// closed first.
    pub(crate) async fn wait_request(&self) -> Option<Request> {
        let received = tokio::select! {
            biased;
            () = self.shared.request_received.wait() => true,
            () = self.shared.stream_closed.wait() => false,
        };
        if received {
            self.state().request.clone()
        } else {
            None
        }
    }

    pub(crate) async fn accept(&self, options: AcceptOptions) -> Result<()> {
        self.require_role(Role::Server)?;
        let subprotocol = options.subprotocol.clone();
        self.send_event(Event::AcceptConnection(AcceptConnection {
            subprotocol: options.subprotocol,
            extra_headers: options.extra_headers,
        }))
        .await?;
        self.state().subprotocol = subprotocol;
        self.shared.open.set();
        debug!(connection = %self, "websocket open");
        Ok(())
    }

    pub(crate) async fn reject(
        &self,
        status_code: u16,
        mut headers: Headers,
        body: Option<Vec<u8>>,
    ) -> Result<()> {
        self.require_role(Role::Server)?;
        let body = body.unwrap_or_default();
        headers.push(("Content-Length".into(), body.len().to_string()));
        let has_body = !body.is_empty();

        self.send_event(Event::RejectConnection(RejectConnection {
            status_code,
            headers,
            has_body,
        }))
        .await?;
        if has_body {
            self.send_event(Event::RejectData(RejectData {
                data: body,
                body_finished: true,
            }))
            .await?;
        }
        self.set_close_reason_if_unset(CloseReason::new(
            CloseCode::Abnormal.as_u16(),
            Some("Rejected WebSocket handshake".into()),
        ));
        self.shared.closed.set();
        debug!(connection = %self, status_code, "websocket handshake rejected");
        Ok(())
    }

    fn require_role(&self, expected: Role) -> Result<()> {
        if self.shared.role == expected {
            Ok(())
        } else {
            Err(Error::WrongRole { expected })
        }
    }

    fn handshake_failure(&self) -> Error {
        let state = self.state();
        if let Some(rejection) = &state.rejection {
            return Error::ConnectionRejected(rejection.clone());
        }
        if let Some(failure) = &state.failure {
            return failure.clone();
        }
        Error::Handshake("connection closed before the opening handshake completed".into())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.shared.state)
    }

    fn engine(&self) -> MutexGuard<'_, Box<dyn ProtocolEngine>> {
        lock(&self.shared.engine)
    }

    fn check_open(&self) -> Result<()> {
        match self.closed() {
            Some(reason) => Err(Error::ConnectionClosed(reason)),
            None => Ok(()),
        }
    }

    fn closed_error(&self) -> Error {
        Error::ConnectionClosed(
            self.closed()
                .unwrap_or_else(|| CloseReason::new(CloseCode::Abnormal.as_u16(), None)),
        )
    }

    fn set_close_reason(&self, reason: CloseReason) {
        self.state().close_reason = Some(reason);
    }

    fn set_close_reason_if_unset(&self, reason: CloseReason) {
        self.state().close_reason.get_or_insert(reason);
    }

    /// `ConnectionClosed` for a connection that ended abnormally (1006),
    /// with the transport or protocol failure behind it as context.
    pub(crate) fn abnormal_closure(&self) -> Option<Error> {
        let state = self.state();
        let reason = state
            .close_reason
            .clone()
            .filter(|reason| reason.code() == CloseCode::Abnormal.as_u16())?;
        let closed = Error::ConnectionClosed(reason);
        Some(match &state.failure {
            Some(failure) => closed.with_context(vec![failure.clone()]),
            None => closed,
        })
    }

    fn record_failure(&self, err: Error) {
        self.state().failure.get_or_insert(err);
    }

    /// No more messages will be delivered.
    fn drop_sender(&self) {
        lock(&self.shared.messages_tx).take();
    }

    /// Local close: pending and future `get_message` calls fail.
    fn close_receive_side(&self) {
        self.shared.recv_closed.set();
        self.drop_sender();
    }

    /// Serialize `event` and write it, under the send lock.
    ///
    /// A write blocked on a full transport gives up once the transport is
    /// closed, and drops the write half on its way out.
    async fn send_event(&self, event: Event) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(self.closed_error());
        };
        let bytes = self.engine().send(event)?;
        let written = tokio::select! {
            biased;
            () = self.shared.stream_closed.wait() => None,
            written = async {
                stream.write_all(&bytes).await?;
                stream.flush().await
            } => Some(written),
        };
        match written {
            Some(written) => {
                if self.shared.stream_closed.is_set() {
                    writer.take();
                }
                written.map_err(Error::from)
            }
            None => {
                debug!(connection = %self, "transport closed during write");
                writer.take();
                Err(self.closed_error())
            }
        }
    }

    /// Close the transport. Safe to call more than once.
    async fn close_stream(&self) -> Result<()> {
        self.shared.stream_closed.set();
        let stream = self.shared.writer.lock().await.take();
        let Some(mut stream) = stream else {
            return Ok(());
        };
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotConnected
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn run_reader(self, mut parts: ReaderParts) -> Result<()> {
        let guard = ReaderGuard(self.clone());
        debug!(connection = %self, "reader task started");
        let result = self.read_loop(&mut parts).await;
        drop(parts);
        self.mark_closed();
        if let Err(err) = self.close_stream().await {
            debug!(connection = %self, error = %err, "failed to close transport");
        }
        drop(guard);
        debug!(connection = %self, reason = ?self.closed(), "reader task finished");
        result
    }

    async fn read_loop(&self, parts: &mut ReaderParts) -> Result<()> {
        if let Some(request) = parts.request.take() {
            if let Err(err) = self.send_event(Event::Request(request)).await {
                debug!(connection = %self, error = %err, "failed to send handshake request");
                self.record_failure(err);
                self.engine().abort();
                return Ok(());
            }
        }

        let mut buf = vec![0u8; self.shared.config.read_size()];
        let mut assembly = Assembly::default();
        loop {
            let read = tokio::select! {
                biased;
                () = self.shared.stream_closed.wait() => return Ok(()),
                read = parts.stream.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => {
                    if self.protocol_state() != ProtocolState::Closed {
                        debug!(connection = %self, "transport closed before closing handshake");
                        self.engine().abort();
                    }
                    return Ok(());
                }
                Ok(n) => n,
                Err(err) => {
                    debug!(connection = %self, error = %err, "transport read failed");
                    self.record_failure(err.into());
                    self.engine().abort();
                    return Ok(());
                }
            };
            debug!(connection = %self, bytes = n, "received bytes");

            let fed = self.engine().feed(&buf[..n]);
            let events = match fed {
                Ok(events) => events,
                Err(err) => {
                    warn!(connection = %self, error = %err, "protocol error, closing abnormally");
                    self.record_failure(err);
                    self.engine().abort();
                    return Ok(());
                }
            };
            for event in events {
                debug!(connection = %self, event = event.kind(), "received event");
                if let Flow::Stop = self.dispatch(event, &mut assembly).await? {
                    return Ok(());
                }
            }
        }
    }

    /// The reader is done: record an abnormal closure unless a reason is
    /// already known, and wake everyone waiting on the connection.
    fn mark_closed(&self) {
        {
            let mut state = self.state();
            state
                .close_reason
                .get_or_insert_with(|| CloseReason::new(CloseCode::Abnormal.as_u16(), None));
            state.pings.drain();
        }
        self.drop_sender();
        self.shared.closed.set();
    }

    /// Closes the transport if this connection is abandoned before its
    /// closing handshake finishes.
    pub(crate) fn close_guard(&self) -> CloseOnDrop {
        CloseOnDrop(Some(Arc::clone(&self.shared)))
    }

    async fn dispatch(&self, event: Event, assembly: &mut Assembly) -> Result<Flow> {
        match event {
            Event::Request(request) => {
                {
                    let mut state = self.state();
                    state.path = request.target.clone();
                    state.handshake_headers = request.extra_headers.clone();
                    state.request = Some(request);
                }
                self.shared.request_received.set();
            }
            Event::AcceptConnection(accept) => {
                {
                    let mut state = self.state();
                    state.subprotocol = accept.subprotocol;
                    state.handshake_headers = accept.extra_headers;
                }
                self.shared.open.set();
                debug!(connection = %self, "websocket open");
            }
            Event::RejectConnection(reject) => {
                let rejection = Rejection {
                    status_code: reject.status_code,
                    headers: reject.headers,
                    body: reject.has_body.then(Vec::new),
                };
                if !reject.has_body {
                    return Err(self.finish_rejection(rejection));
                }
                self.state().pending_rejection = Some(rejection);
            }
            Event::RejectData(data) => {
                let finished = {
                    let mut state = self.state();
                    if let Some(rejection) = state.pending_rejection.as_mut() {
                        rejection
                            .body
                            .get_or_insert_with(Vec::new)
                            .extend_from_slice(&data.data);
                    }
                    if data.body_finished {
                        state.pending_rejection.take()
                    } else {
                        None
                    }
                };
                if let Some(rejection) = finished {
                    return Err(self.finish_rejection(rejection));
                }
            }
            Event::TextMessage(text) => {
                assembly.size += text.data.len();
                if assembly.size > self.shared.config.max_message_size {
                    return Ok(self.message_too_big(assembly).await);
                }
                assembly.text.push_str(&text.data);
                if text.message_finished {
                    assembly.size = 0;
                    let message = Message::Text(std::mem::take(&mut assembly.text));
                    self.deliver(message).await;
                }
            }
            Event::BytesMessage(bytes) => {
                assembly.size += bytes.data.len();
                if assembly.size > self.shared.config.max_message_size {
                    return Ok(self.message_too_big(assembly).await);
                }
                assembly.binary.extend_from_slice(&bytes.data);
                if bytes.message_finished {
                    assembly.size = 0;
                    let message = Message::Binary(std::mem::take(&mut assembly.binary));
                    self.deliver(message).await;
                }
            }
            Event::Ping(ping) => {
                if let Err(err) = self.send_event(Event::Pong(ping.response())).await {
                    debug!(connection = %self, error = %err, "failed to answer ping");
                }
            }
            Event::Pong(pong) => {
                let woken = self.state().pings.resolve(&pong.payload);
                if woken == 0 {
                    debug!(connection = %self, "ignoring unsolicited pong");
                }
            }
            Event::CloseConnection(close) => {
                if self.protocol_state() == ProtocolState::RemoteClosing {
                    let response = Event::CloseConnection(close.response());
                    if let Err(err) = self.send_event(response).await {
                        debug!(connection = %self, error = %err, "failed to answer close");
                    }
                }
                let reason = CloseReason::new(close.code, close.reason);
                debug!(connection = %self, reason = %reason, "websocket closed");
                {
                    let mut state = self.state();
                    state.close_reason = Some(reason);
                    state.pings.drain();
                }
                self.drop_sender();
                self.shared.closed.set();
                if self.is_server() {
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn finish_rejection(&self, rejection: Rejection) -> Error {
        debug!(connection = %self, status_code = rejection.status_code, "handshake rejected");
        {
            let mut state = self.state();
            state.rejection = Some(rejection.clone());
            state
                .close_reason
                .get_or_insert_with(|| CloseReason::new(CloseCode::Abnormal.as_u16(), None));
        }
        self.shared.closed.set();
        Error::ConnectionRejected(rejection)
    }

    async fn message_too_big(&self, assembly: &mut Assembly) -> Flow {
        let reason = format!(
            "Exceeded maximum message size: {} bytes",
            self.shared.config.max_message_size
        );
        debug!(connection = %self, "{reason}");
        let code = CloseCode::MessageTooBig.as_u16();
        self.set_close_reason(CloseReason::new(code, Some(reason.clone())));
        let close = Event::CloseConnection(CloseConnection {
            code,
            reason: Some(reason),
        });
        if let Err(err) = self.send_event(close).await {
            debug!(connection = %self, error = %err, "failed to send close frame");
        }
        *assembly = Assembly::default();
        self.close_receive_side();
        Flow::Stop
    }

    /// Push a complete message to the channel, waiting while it is full.
    async fn deliver(&self, message: Message) {
        let sender = lock(&self.shared.messages_tx).clone();
        let Some(sender) = sender else {
            return;
        };
        tokio::select! {
            biased;
            () = self.shared.recv_closed.wait() => {
                debug!(connection = %self, "receive side closed, dropping message");
            }
            () = self.shared.stream_closed.wait() => {}
            sent = sender.send(message) => {
                if sent.is_err() {
                    debug!(connection = %self, "message channel closed, dropping message");
                }
            }
        }
    }
}

impl fmt::Display for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.shared.role, self.shared.id)
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("local", &self.shared.local)
            .field("remote", &self.shared.remote)
            .field("closed", &self.closed())
            .finish()
    }
}

/// Closes the transport when dropped while armed.
pub(crate) struct CloseOnDrop(Option<Arc<Shared>>);

impl CloseOnDrop {
    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(shared) = self.0.take() {
            shared.abandon_stream();
        }
    }
}

/// Runs the synchronous part of reader cleanup even when the reader task
/// is cancelled.
struct ReaderGuard(WebSocketConnection);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.mark_closed();
        self.0.shared.abandon_stream();
    }
}

impl Shared {
    fn abandon_stream(&self) {
        self.stream_closed.set();
        // A writer holding the lock drops the stream itself once it sees
        // the latch.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn random_payload() -> Result<Vec<u8>> {
    let mut payload = vec![0u8; 4];
    getrandom::getrandom(&mut payload)
        .map_err(|e| Error::Internal(format!("failed to generate ping payload: {e}")))?;
    Ok(payload)
}
