//! HTTP/1.1 Upgrade handshake encoding and parsing (RFC 6455 Section 4).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::protocol::events::{AcceptConnection, Headers, RejectConnection, Request};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the size of a request or response head.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Headers the handshake writes itself; user-supplied duplicates are rejected.
const RESERVED_HEADERS: [&str; 7] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-accept",
    "sec-websocket-protocol",
];

/// Computes the Sec-WebSocket-Accept value: Base64(SHA-1(key + GUID)).
///
/// ```
/// use wsnursery::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh Sec-WebSocket-Key (16 random bytes, Base64).
///
/// # Errors
///
/// Returns `Error::Internal` if the OS RNG is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::Internal(format!("random source unavailable: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Position just past the blank line ending an HTTP head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Case-insensitive header lookup. Returns the first match.
#[must_use]
pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn comma_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.is_empty() || name.contains([':', '\r', '\n', ' ']) {
        return Err(Error::Config(format!("invalid header name {name:?}")));
    }
    if value.contains(['\r', '\n']) {
        return Err(Error::Config(format!(
            "header {name} contains CR or LF characters"
        )));
    }
    Ok(())
}

fn write_headers(buf: &mut Vec<u8>, headers: &[(String, String)]) -> Result<()> {
    for (name, value) in headers {
        validate_header(name, value)?;
        buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    Ok(())
}

fn reject_reserved(headers: &[(String, String)]) -> Result<()> {
    match headers
        .iter()
        .find(|(n, _)| RESERVED_HEADERS.contains(&n.to_ascii_lowercase().as_str()))
    {
        Some((name, _)) => Err(Error::Config(format!(
            "header {name} is set by the handshake"
        ))),
        None => Ok(()),
    }
}

/// Split an HTTP head into its start line and header list.
fn parse_head(head: &[u8]) -> Result<(&str, Headers)> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::Handshake("handshake is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");
    let start = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::Handshake("empty handshake".into()))?;

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Handshake(format!("malformed header line {line:?}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok((start, headers))
}

fn require_upgrade_headers(headers: &[(String, String)]) -> Result<()> {
    let upgrade = header(headers, "upgrade")
        .ok_or_else(|| Error::Handshake("missing Upgrade header".into()))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::Handshake(format!("invalid Upgrade header: {upgrade}")));
    }
    let connection = header(headers, "connection")
        .ok_or_else(|| Error::Handshake("missing Connection header".into()))?;
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::Handshake(format!(
            "invalid Connection header: {connection}"
        )));
    }
    Ok(())
}

/// Serialize a client's opening request.
///
/// # Errors
///
/// Returns `Error::Config` if an extra header is malformed or collides with a
/// header the handshake sets itself.
pub fn encode_request(request: &Request, key: &str) -> Result<Vec<u8>> {
    reject_reserved(&request.extra_headers)?;
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", request.target).as_bytes());
    buf.extend_from_slice(format!("Host: {}\r\n", request.host).as_bytes());
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(format!("Sec-WebSocket-Key: {key}\r\n").as_bytes());
    buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
    if !request.subprotocols.is_empty() {
        let protocols = request.subprotocols.join(", ");
        validate_header("Sec-WebSocket-Protocol", &protocols)?;
        buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {protocols}\r\n").as_bytes());
    }
    write_headers(&mut buf, &request.extra_headers)?;
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

/// Parse and validate a client's opening request.
///
/// Returns the request and its Sec-WebSocket-Key.
///
/// # Errors
///
/// Returns `Error::Handshake` if the request is not a valid version 13
/// WebSocket upgrade.
pub fn parse_request(head: &[u8]) -> Result<(Request, String)> {
    let (start, headers) = parse_head(head)?;
    let parts: Vec<&str> = start.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::Handshake("invalid request line".into()));
    }
    if parts[0] != "GET" {
        return Err(Error::Handshake(format!(
            "expected GET method, got {}",
            parts[0]
        )));
    }
    if parts[2] != "HTTP/1.1" {
        return Err(Error::Handshake(format!(
            "expected HTTP/1.1, got {}",
            parts[2]
        )));
    }

    require_upgrade_headers(&headers)?;

    let host = header(&headers, "host")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Handshake("missing Host header".into()))?
        .to_string();

    let version = header(&headers, "sec-websocket-version")
        .ok_or_else(|| Error::Handshake("missing Sec-WebSocket-Version header".into()))?;
    if version != "13" {
        return Err(Error::Handshake(format!(
            "unsupported WebSocket version: {version} (expected 13)"
        )));
    }

    let key = header(&headers, "sec-websocket-key")
        .ok_or_else(|| Error::Handshake("missing Sec-WebSocket-Key header".into()))?
        .to_string();
    match BASE64.decode(&key) {
        Ok(decoded) if decoded.len() == 16 => {}
        _ => {
            return Err(Error::Handshake(
                "Sec-WebSocket-Key must be 16 bytes of Base64".into(),
            ));
        }
    }

    let request = Request {
        host,
        target: parts[1].to_string(),
        subprotocols: comma_list(header(&headers, "sec-websocket-protocol")),
        extensions: comma_list(header(&headers, "sec-websocket-extensions")),
        extra_headers: headers,
    };
    Ok((request, key))
}

/// Serialize a `101 Switching Protocols` response.
///
/// # Errors
///
/// Returns `Error::Config` if the subprotocol or an extra header is malformed.
pub fn encode_accept(key: &str, accept: &AcceptConnection) -> Result<Vec<u8>> {
    reject_reserved(&accept.extra_headers)?;
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(key)).as_bytes());
    if let Some(protocol) = &accept.subprotocol {
        validate_header("Sec-WebSocket-Protocol", protocol)?;
        buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {protocol}\r\n").as_bytes());
    }
    write_headers(&mut buf, &accept.extra_headers)?;
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

/// Serialize a rejection response head.
///
/// # Errors
///
/// Returns `Error::Config` for status 101 or a malformed header.
pub fn encode_reject(reject: &RejectConnection) -> Result<Vec<u8>> {
    if reject.status_code == 101 || !(100..=599).contains(&reject.status_code) {
        return Err(Error::Config(format!(
            "cannot reject a handshake with status {}",
            reject.status_code
        )));
    }
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            reject.status_code,
            reason_phrase(reject.status_code)
        )
        .as_bytes(),
    );
    write_headers(&mut buf, &reject.headers)?;
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

/// A parsed response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: Headers,
}

impl ResponseHead {
    /// Parse a server's response head.
    ///
    /// # Errors
    ///
    /// Returns `Error::Handshake` if the status line is malformed.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let (start, headers) = parse_head(head)?;
        let mut parts = start.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/1.") {
            return Err(Error::Handshake(format!("invalid status line: {start}")));
        }
        let status_code = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| Error::Handshake(format!("invalid status line: {start}")))?;
        Ok(Self {
            status_code,
            headers,
        })
    }

    /// Declared body length of a rejection response.
    ///
    /// Responses without `Content-Length` are treated as bodiless.
    #[must_use]
    pub fn content_length(&self) -> usize {
        header(&self.headers, "content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Validate a `101` response against the request that produced it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Handshake` if the upgrade headers are missing, the
    /// accept key does not match, or the server picked a subprotocol that
    /// was not offered.
    pub fn into_accept(self, key: &str, offered: &[String]) -> Result<AcceptConnection> {
        require_upgrade_headers(&self.headers)?;
        let accept = header(&self.headers, "sec-websocket-accept")
            .ok_or_else(|| Error::Handshake("missing Sec-WebSocket-Accept header".into()))?;
        if accept != compute_accept_key(key) {
            return Err(Error::Handshake("Sec-WebSocket-Accept mismatch".into()));
        }
        let subprotocol = header(&self.headers, "sec-websocket-protocol").map(str::to_string);
        if let Some(protocol) = &subprotocol {
            if !offered.contains(protocol) {
                return Err(Error::Handshake(format!(
                    "server selected unrequested subprotocol {protocol}"
                )));
            }
        }
        Ok(AcceptConnection {
            subprotocol,
            extra_headers: self.headers,
        })
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(compute_accept_key(RFC_KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_generate_key_is_16_bytes() {
        let key = generate_key().unwrap();
        assert_eq!(BASE64.decode(&key).unwrap().len(), 16);
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request {
            host: "example.com:8000".into(),
            target: "/chat?room=1".into(),
            subprotocols: vec!["chat".into(), "superchat".into()],
            extensions: vec![],
            extra_headers: vec![("Origin".into(), "http://example.com".into())],
        };
        let bytes = encode_request(&request, RFC_KEY).unwrap();
        let end = find_head_end(&bytes).unwrap();
        assert_eq!(end, bytes.len());

        let (parsed, key) = parse_request(&bytes).unwrap();
        assert_eq!(key, RFC_KEY);
        assert_eq!(parsed.host, "example.com:8000");
        assert_eq!(parsed.target, "/chat?room=1");
        assert_eq!(parsed.subprotocols, vec!["chat", "superchat"]);
        assert_eq!(header(&parsed.extra_headers, "origin"), Some("http://example.com"));
    }

    #[test]
    fn test_parse_request_rejects_bad_requests() {
        let missing_key = b"GET / HTTP/1.1\r\nHost: a\r\nUpgrade: websocket\r\n\
            Connection: Upgrade\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert!(matches!(parse_request(missing_key), Err(Error::Handshake(_))));

        let post = b"POST / HTTP/1.1\r\nHost: a\r\n\r\n";
        assert!(parse_request(post).is_err());

        let old_version = b"GET / HTTP/1.1\r\nHost: a\r\nUpgrade: websocket\r\n\
            Connection: keep-alive, Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 8\r\n\r\n";
        assert!(parse_request(old_version).is_err());

        let short_key = b"GET / HTTP/1.1\r\nHost: a\r\nUpgrade: websocket\r\n\
            Connection: Upgrade\r\nSec-WebSocket-Key: c2hvcnQ=\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";
        assert!(parse_request(short_key).is_err());
    }

    #[test]
    fn test_encode_request_rejects_reserved_headers() {
        let request = Request {
            host: "a".into(),
            target: "/".into(),
            extra_headers: vec![("Sec-WebSocket-Key".into(), "x".into())],
            ..Request::default()
        };
        assert!(matches!(encode_request(&request, RFC_KEY), Err(Error::Config(_))));
    }

    #[test]
    fn test_header_injection_rejected() {
        let accept = AcceptConnection {
            subprotocol: Some("chat\r\nX-Evil: 1".into()),
            extra_headers: vec![],
        };
        assert!(encode_accept(RFC_KEY, &accept).is_err());
    }

    #[test]
    fn test_accept_roundtrip() {
        let accept = AcceptConnection {
            subprotocol: Some("chat".into()),
            extra_headers: vec![("X-Server".into(), "wsnursery".into())],
        };
        let bytes = encode_accept(RFC_KEY, &accept).unwrap();
        let head = ResponseHead::parse(&bytes).unwrap();
        assert_eq!(head.status_code, 101);
        let accepted = head.into_accept(RFC_KEY, &["chat".to_string()]).unwrap();
        assert_eq!(accepted.subprotocol.as_deref(), Some("chat"));
        assert_eq!(header(&accepted.extra_headers, "x-server"), Some("wsnursery"));
    }

    #[test]
    fn test_accept_key_mismatch() {
        let bytes = encode_accept(RFC_KEY, &AcceptConnection::default()).unwrap();
        let head = ResponseHead::parse(&bytes).unwrap();
        assert!(head.into_accept("AAAAAAAAAAAAAAAAAAAAAA==", &[]).is_err());
    }

    #[test]
    fn test_unrequested_subprotocol() {
        let accept = AcceptConnection {
            subprotocol: Some("other".into()),
            extra_headers: vec![],
        };
        let bytes = encode_accept(RFC_KEY, &accept).unwrap();
        let head = ResponseHead::parse(&bytes).unwrap();
        assert!(head.into_accept(RFC_KEY, &["chat".to_string()]).is_err());
    }

    #[test]
    fn test_reject_roundtrip() {
        let reject = RejectConnection {
            status_code: 403,
            headers: vec![("Content-Length".into(), "7".into())],
            has_body: true,
        };
        let bytes = encode_reject(&reject).unwrap();
        assert!(bytes.starts_with(b"HTTP/1.1 403 Forbidden\r\n"));
        let head = ResponseHead::parse(&bytes).unwrap();
        assert_eq!(head.status_code, 403);
        assert_eq!(head.content_length(), 7);
    }

    #[test]
    fn test_reject_with_101_is_an_error() {
        let reject = RejectConnection {
            status_code: 101,
            headers: vec![],
            has_body: false,
        };
        assert!(encode_reject(&reject).is_err());
    }
}
