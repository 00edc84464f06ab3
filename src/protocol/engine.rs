//! Sans-IO protocol engine.
//!
//! A [`ProtocolEngine`] owns the WebSocket protocol state of one connection.
//! It never touches a socket: the connection feeds it received bytes and
//! gets events back, and hands it events to send and gets bytes back.
//! [`WsProtocol`] is the built-in engine.

use bytes::{Buf, BytesMut};

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::events::{
    BytesMessage, CloseConnection, Event, Ping, Pong, RejectConnection, RejectData, TextMessage,
};
use crate::protocol::frame::{
    FrameHeader, MAX_CONTROL_FRAME_PAYLOAD, encode_close_payload, encode_frame,
    parse_close_payload,
};
use crate::protocol::handshake::{
    self, MAX_HEAD_SIZE, ResponseHead, encode_accept, encode_reject, encode_request,
    find_head_end, parse_request,
};
use crate::protocol::mask::{MaskGenerator, apply_mask};
use crate::protocol::OpCode;

/// Protocol state as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake complete, data may flow.
    Open,
    /// We sent a close frame and wait for the peer's.
    LocalClosing,
    /// The peer sent a close frame and waits for ours.
    RemoteClosing,
    /// The server is sending a rejection response.
    Rejecting,
    /// Nothing more will be sent or received.
    Closed,
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolState::Connecting => "CONNECTING",
            ProtocolState::Open => "OPEN",
            ProtocolState::LocalClosing => "LOCAL_CLOSING",
            ProtocolState::RemoteClosing => "REMOTE_CLOSING",
            ProtocolState::Rejecting => "REJECTING",
            ProtocolState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Contract between a connection and its protocol engine.
pub trait ProtocolEngine: Send {
    /// Consume received bytes and return the events they complete.
    ///
    /// # Errors
    ///
    /// Returns an error when the peer violated the protocol. The engine is
    /// unusable afterwards.
    fn feed(&mut self, data: &[u8]) -> Result<Vec<Event>>;

    /// Serialize an outgoing event and advance the state machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the event is not valid in the current state.
    fn send(&mut self, event: Event) -> Result<Vec<u8>>;

    /// Current protocol state.
    fn state(&self) -> ProtocolState;

    /// `true` for client-side engines.
    fn is_client(&self) -> bool;

    /// Force the state to `Closed` after the transport went away.
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataKind {
    Text,
    Binary,
}

#[derive(Debug)]
struct PartialFrame {
    fin: bool,
    mask: Option<[u8; 4]>,
    remaining: u64,
    consumed: usize,
}

/// The built-in RFC 6455 engine.
///
/// Data frames are surfaced incrementally: every [`feed`](ProtocolEngine::feed)
/// yields whatever part of the current frame's payload has arrived, so a
/// connection can enforce its message size limit before a large frame is
/// buffered. Text chunks are split on UTF-8 boundaries.
#[derive(Debug)]
pub struct WsProtocol {
    role: Role,
    state: ProtocolState,
    buffer: BytesMut,
    masks: MaskGenerator,
    /// Client: key we sent. Server: key we received.
    key: Option<String>,
    offered_subprotocols: Vec<String>,
    request_received: bool,
    reject_remaining: usize,
    frame: Option<PartialFrame>,
    message: Option<DataKind>,
    utf8_tail: Vec<u8>,
    sending: Option<DataKind>,
}

impl WsProtocol {
    /// Create an engine for `role`.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: ProtocolState::Connecting,
            buffer: BytesMut::with_capacity(4096),
            masks: MaskGenerator::new(),
            key: None,
            offered_subprotocols: Vec::new(),
            request_received: false,
            reject_remaining: 0,
            frame: None,
            message: None,
            utf8_tail: Vec::new(),
            sending: None,
        }
    }

    /// Client-side engine.
    #[must_use]
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Server-side engine.
    #[must_use]
    pub fn server() -> Self {
        Self::new(Role::Server)
    }

    fn invalid_send(&self, event: &Event) -> Error {
        Error::Protocol(format!(
            "cannot send {} as {} in state {}",
            event.kind(),
            self.role,
            self.state
        ))
    }

    /// Opcode for the next outgoing data frame; later fragments of a message
    /// are continuations.
    fn outgoing_opcode(&mut self, kind: DataKind, message_finished: bool) -> Result<OpCode> {
        let opcode = match self.sending {
            None => match kind {
                DataKind::Text => OpCode::Text,
                DataKind::Binary => OpCode::Binary,
            },
            Some(current) if current == kind => OpCode::Continuation,
            Some(_) => {
                return Err(Error::Protocol(
                    "cannot interleave text and binary fragments".into(),
                ));
            }
        };
        self.sending = if message_finished { None } else { Some(kind) };
        Ok(opcode)
    }

    fn frame_bytes(&mut self, fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        let mask = self.role.must_mask().then(|| self.masks.next_mask());
        let mut out = Vec::new();
        encode_frame(fin, opcode, payload, mask, &mut out);
        out
    }

    /// Advance the opening handshake. Returns `false` when more data is needed.
    fn handshake_step(&mut self, events: &mut Vec<Event>) -> Result<bool> {
        if self.role == Role::Server && self.request_received {
            return Ok(false);
        }
        if self.role == Role::Client && self.key.is_none() {
            return Ok(false);
        }
        let Some(end) = find_head_end(&self.buffer) else {
            if self.buffer.len() > MAX_HEAD_SIZE {
                return Err(Error::Handshake(format!(
                    "handshake exceeds {MAX_HEAD_SIZE} bytes"
                )));
            }
            return Ok(false);
        };
        let head = self.buffer.split_to(end);

        match self.role {
            Role::Server => {
                let (request, key) = parse_request(&head)?;
                self.key = Some(key);
                self.request_received = true;
                events.push(Event::Request(request));
                Ok(false)
            }
            Role::Client => {
                let response = ResponseHead::parse(&head)?;
                if response.status_code == 101 {
                    let key = self.key.as_deref().unwrap_or_default();
                    let accept = response.into_accept(key, &self.offered_subprotocols)?;
                    self.state = ProtocolState::Open;
                    events.push(Event::AcceptConnection(accept));
                } else {
                    self.reject_remaining = response.content_length();
                    let has_body = self.reject_remaining > 0;
                    self.state = if has_body {
                        ProtocolState::Rejecting
                    } else {
                        ProtocolState::Closed
                    };
                    events.push(Event::RejectConnection(RejectConnection {
                        status_code: response.status_code,
                        headers: response.headers,
                        has_body,
                    }));
                }
                Ok(true)
            }
        }
    }

    /// Consume rejection body bytes (client side).
    fn reject_body_step(&mut self, events: &mut Vec<Event>) -> bool {
        let n = self.reject_remaining.min(self.buffer.len());
        if n == 0 {
            return false;
        }
        let data = self.buffer.split_to(n).to_vec();
        self.reject_remaining -= n;
        let body_finished = self.reject_remaining == 0;
        if body_finished {
            self.state = ProtocolState::Closed;
            self.buffer.clear();
        }
        events.push(Event::RejectData(RejectData {
            data,
            body_finished,
        }));
        !body_finished
    }

    fn check_header(&self, header: &FrameHeader) -> Result<()> {
        if header.rsv != 0 {
            return Err(Error::Protocol(
                "reserved bits set without negotiated extension".into(),
            ));
        }
        match (header.mask.is_some(), self.role.expects_masked()) {
            (false, true) => return Err(Error::Protocol("client frame must be masked".into())),
            (true, false) => {
                return Err(Error::Protocol("server frame must not be masked".into()));
            }
            _ => {}
        }
        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::Protocol("control frames cannot be fragmented".into()));
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::Protocol(format!(
                    "control frame payload too large: {} bytes",
                    header.payload_len
                )));
            }
        } else {
            match (header.opcode, self.message) {
                (OpCode::Continuation, None) => {
                    return Err(Error::Protocol("continuation frame without a message".into()));
                }
                (OpCode::Text | OpCode::Binary, Some(_)) => {
                    return Err(Error::Protocol(
                        "new data frame while a fragmented message is in progress".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse the next frame, or the next chunk of the current frame.
    /// Returns `false` when more data is needed.
    fn frame_step(&mut self, events: &mut Vec<Event>) -> Result<bool> {
        if self.frame.is_none() {
            let Some(header) = FrameHeader::parse(&self.buffer)? else {
                return Ok(false);
            };
            self.check_header(&header)?;

            if header.opcode.is_control() {
                let total = header.header_len + header.payload_len as usize;
                if self.buffer.len() < total {
                    return Ok(false);
                }
                self.buffer.advance(header.header_len);
                let mut payload = self.buffer.split_to(header.payload_len as usize).to_vec();
                if let Some(mask) = header.mask {
                    apply_mask(&mut payload, mask, 0);
                }
                return self.control_frame(header.opcode, payload, events);
            }

            self.buffer.advance(header.header_len);
            match header.opcode {
                OpCode::Text => self.message = Some(DataKind::Text),
                OpCode::Binary => self.message = Some(DataKind::Binary),
                _ => {}
            }
            self.frame = Some(PartialFrame {
                fin: header.fin,
                mask: header.mask,
                remaining: header.payload_len,
                consumed: 0,
            });
        }

        let Some(frame) = self.frame.as_mut() else {
            return Ok(false);
        };
        let n = frame.remaining.min(self.buffer.len() as u64) as usize;
        if n == 0 && frame.remaining > 0 {
            return Ok(false);
        }
        let mut chunk = self.buffer.split_to(n).to_vec();
        if let Some(mask) = frame.mask {
            apply_mask(&mut chunk, mask, frame.consumed);
        }
        frame.consumed += n;
        frame.remaining -= n as u64;
        let frame_finished = frame.remaining == 0;
        let message_finished = frame_finished && frame.fin;
        if frame_finished {
            self.frame = None;
        }

        let kind = self.message.unwrap_or(DataKind::Binary);
        if message_finished {
            self.message = None;
        }
        match kind {
            DataKind::Binary => events.push(Event::BytesMessage(BytesMessage {
                data: chunk,
                frame_finished,
                message_finished,
            })),
            DataKind::Text => {
                let data = self.decode_text(chunk, message_finished)?;
                if !data.is_empty() || frame_finished {
                    events.push(Event::TextMessage(TextMessage {
                        data,
                        frame_finished,
                        message_finished,
                    }));
                }
            }
        }
        Ok(true)
    }

    /// Decode as much UTF-8 as possible, carrying an incomplete trailing
    /// sequence over to the next chunk.
    fn decode_text(&mut self, chunk: Vec<u8>, message_finished: bool) -> Result<String> {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(&chunk);
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(err) => {
                let utf8 = err.utf8_error();
                if utf8.error_len().is_some() || message_finished {
                    return Err(Error::Protocol("invalid UTF-8 in text message".into()));
                }
                let mut bytes = err.into_bytes();
                self.utf8_tail = bytes.split_off(utf8.valid_up_to());
                String::from_utf8(bytes)
                    .map_err(|_| Error::Protocol("invalid UTF-8 in text message".into()))
            }
        }
    }

    fn control_frame(
        &mut self,
        opcode: OpCode,
        payload: Vec<u8>,
        events: &mut Vec<Event>,
    ) -> Result<bool> {
        match opcode {
            OpCode::Ping => events.push(Event::Ping(Ping { payload })),
            OpCode::Pong => events.push(Event::Pong(Pong { payload })),
            _ => {
                let (code, reason) = parse_close_payload(&payload)?;
                self.state = match self.state {
                    ProtocolState::LocalClosing => ProtocolState::Closed,
                    _ => ProtocolState::RemoteClosing,
                };
                self.buffer.clear();
                events.push(Event::CloseConnection(CloseConnection { code, reason }));
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl ProtocolEngine for WsProtocol {
    fn feed(&mut self, data: &[u8]) -> Result<Vec<Event>> {
        self.buffer.extend_from_slice(data);
        let mut events = Vec::new();
        loop {
            let progressed = match self.state {
                ProtocolState::Connecting => self.handshake_step(&mut events)?,
                ProtocolState::Rejecting if self.role == Role::Client => {
                    self.reject_body_step(&mut events)
                }
                ProtocolState::Open | ProtocolState::LocalClosing => {
                    self.frame_step(&mut events)?
                }
                ProtocolState::Rejecting
                | ProtocolState::RemoteClosing
                | ProtocolState::Closed => {
                    self.buffer.clear();
                    false
                }
            };
            if !progressed {
                break;
            }
        }
        Ok(events)
    }

    fn send(&mut self, event: Event) -> Result<Vec<u8>> {
        use ProtocolState as S;

        match (&event, self.role, self.state) {
            (Event::Request(request), Role::Client, S::Connecting) if self.key.is_none() => {
                let key = handshake::generate_key()?;
                let bytes = encode_request(request, &key)?;
                self.offered_subprotocols = request.subprotocols.clone();
                self.key = Some(key);
                Ok(bytes)
            }
            (Event::AcceptConnection(accept), Role::Server, S::Connecting)
                if self.request_received =>
            {
                let key = self.key.as_deref().unwrap_or_default();
                let bytes = encode_accept(key, accept)?;
                self.state = S::Open;
                Ok(bytes)
            }
            (Event::RejectConnection(reject), Role::Server, S::Connecting) => {
                let bytes = encode_reject(reject)?;
                self.state = if reject.has_body { S::Rejecting } else { S::Closed };
                Ok(bytes)
            }
            (Event::RejectData(data), Role::Server, S::Rejecting) => {
                if data.body_finished {
                    self.state = S::Closed;
                }
                Ok(data.data.clone())
            }
            (Event::TextMessage(text), _, S::Open) => {
                let opcode = self.outgoing_opcode(DataKind::Text, text.message_finished)?;
                Ok(self.frame_bytes(text.message_finished, opcode, text.data.as_bytes()))
            }
            (Event::BytesMessage(bytes), _, S::Open) => {
                let opcode = self.outgoing_opcode(DataKind::Binary, bytes.message_finished)?;
                Ok(self.frame_bytes(bytes.message_finished, opcode, &bytes.data))
            }
            (Event::Ping(ping), _, S::Open | S::LocalClosing | S::RemoteClosing) => {
                if ping.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(Error::Protocol("ping payload exceeds 125 bytes".into()));
                }
                Ok(self.frame_bytes(true, OpCode::Ping, &ping.payload))
            }
            (Event::Pong(pong), _, S::Open | S::LocalClosing | S::RemoteClosing) => {
                if pong.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(Error::Protocol("pong payload exceeds 125 bytes".into()));
                }
                Ok(self.frame_bytes(true, OpCode::Pong, &pong.payload))
            }
            (Event::CloseConnection(close), _, S::Open | S::RemoteClosing) => {
                let payload = encode_close_payload(close.code, close.reason.as_deref());
                self.state = if self.state == S::Open {
                    S::LocalClosing
                } else {
                    S::Closed
                };
                Ok(self.frame_bytes(true, OpCode::Close, &payload))
            }
            _ => Err(self.invalid_send(&event)),
        }
    }

    fn state(&self) -> ProtocolState {
        self.state
    }

    fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    fn abort(&mut self) {
        self.state = ProtocolState::Closed;
        self.buffer.clear();
    }
}
