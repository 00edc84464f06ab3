//! WebSocket frame headers and frame encoding (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                     Masking key (if present)                  |
//! +---------------------------------------------------------------+
//! |                          Payload data                         |
//! +---------------------------------------------------------------+
//! ```
//!
//! Only the header is parsed here. The engine consumes the payload
//! incrementally so a large frame never has to be buffered whole.

use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Maximum close reason length (control payload minus the two code bytes).
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// A parsed frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// RSV1..RSV3 as the high bits of the first byte (`0x70` mask).
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present on client-to-server frames.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: u64,
    /// Header length in bytes, including the masking key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the header is incomplete.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` for reserved opcodes or a 64-bit length with
    /// the most significant bit set.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = (byte1 & 0x80) != 0;

        let (payload_len, len_size) = match byte1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut len = [0u8; 8];
                len.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(len);
                if len & (1 << 63) != 0 {
                    return Err(Error::Protocol("payload length has MSB set".into()));
                }
                (len, 8)
            }
            short => (u64::from(short), 0),
        };

        let mask_offset = 2 + len_size;
        let header_len = if masked { mask_offset + 4 } else { mask_offset };
        if buf.len() < header_len {
            return Ok(None);
        }

        let mask = masked.then(|| {
            [
                buf[mask_offset],
                buf[mask_offset + 1],
                buf[mask_offset + 2],
                buf[mask_offset + 3],
            ]
        });

        Ok(Some(FrameHeader {
            fin: (byte0 & 0x80) != 0,
            rsv: byte0 & 0x70,
            opcode,
            mask,
            payload_len,
            header_len,
        }))
    }
}

/// Append one complete frame to `out`, masking the payload when `mask` is given.
pub fn encode_frame(
    fin: bool,
    opcode: OpCode,
    payload: &[u8],
    mask: Option<[u8; 4]>,
    out: &mut Vec<u8>,
) {
    let payload_len = payload.len();
    out.reserve(payload_len + 14);

    let mut byte0 = opcode.as_u8();
    if fin {
        byte0 |= 0x80;
    }
    out.push(byte0);

    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if payload_len <= 125 {
        out.push(mask_bit | payload_len as u8);
    } else if payload_len <= usize::from(u16::MAX) {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    let start = match mask {
        Some(key) => {
            out.extend_from_slice(&key);
            out.len()
        }
        None => out.len(),
    };
    out.extend_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut out[start..], key, 0);
    }
}

/// Build a close frame payload.
///
/// Codes that must not appear on the wire (1005, 1006, 1015) produce an
/// empty payload. Reasons are truncated to fit in a control frame.
#[must_use]
pub fn encode_close_payload(code: u16, reason: Option<&str>) -> Vec<u8> {
    if CloseCode::from_u16(code).is_reserved() {
        return Vec::new();
    }
    let mut payload = code.to_be_bytes().to_vec();
    if let Some(reason) = reason {
        let mut end = reason.len().min(MAX_CLOSE_REASON);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        payload.extend_from_slice(&reason.as_bytes()[..end]);
    }
    payload
}

/// Parse a close frame payload into a code and optional reason.
///
/// An empty payload means "no status received" (1005).
///
/// # Errors
///
/// Returns `Error::Protocol` for a one-byte payload, a code that may not be
/// sent, or a reason that is not UTF-8.
pub fn parse_close_payload(payload: &[u8]) -> Result<(u16, Option<String>)> {
    match payload.len() {
        0 => Ok((CloseCode::NoStatusReceived.as_u16(), None)),
        1 => Err(Error::Protocol("close payload of one byte".into())),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !CloseCode::from_u16(code).is_valid() {
                return Err(Error::Protocol(format!("invalid close code {code}")));
            }
            let reason = std::str::from_utf8(&payload[2..])?;
            Ok((code, (!reason.is_empty()).then(|| reason.to_owned())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unmasked_text_header() {
        // FIN=1, opcode=1 (text), unmasked, payload="Hello"
        let data = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let header = FrameHeader::parse(&data).unwrap().unwrap();
        assert!(header.fin);
        assert_eq!(header.rsv, 0);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(header.mask, None);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.header_len, 2);
    }

    #[test]
    fn test_parse_masked_header() {
        let data = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f];
        let header = FrameHeader::parse(&data).unwrap().unwrap();
        assert_eq!(header.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(header.header_len, 6);
    }

    #[test]
    fn test_parse_extended_lengths() {
        let data = [0x82, 126, 0x01, 0x00];
        let header = FrameHeader::parse(&data).unwrap().unwrap();
        assert_eq!(header.payload_len, 256);
        assert_eq!(header.header_len, 4);

        let data = [0x82, 127, 0, 0, 0, 0, 0, 1, 0, 0];
        let header = FrameHeader::parse(&data).unwrap().unwrap();
        assert_eq!(header.payload_len, 65536);
        assert_eq!(header.header_len, 10);
    }

    #[test]
    fn test_parse_incomplete_header() {
        assert_eq!(FrameHeader::parse(&[0x81]).unwrap(), None);
        assert_eq!(FrameHeader::parse(&[0x82, 126, 0x01]).unwrap(), None);
        assert_eq!(FrameHeader::parse(&[0x81, 0x85, 0x37, 0xfa]).unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_msb_length() {
        let data = [0x82, 127, 0x80, 0, 0, 0, 0, 0, 0, 0];
        assert!(FrameHeader::parse(&data).is_err());
    }

    #[test]
    fn test_parse_reports_rsv_bits() {
        let header = FrameHeader::parse(&[0xC1, 0x00]).unwrap().unwrap();
        assert_eq!(header.rsv, 0x40);
    }

    #[test]
    fn test_encode_unmasked() {
        let mut out = Vec::new();
        encode_frame(true, OpCode::Text, b"Hello", None, &mut out);
        assert_eq!(out, [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_encode_masked_rfc_example() {
        let mut out = Vec::new();
        encode_frame(true, OpCode::Text, b"Hello", Some([0x37, 0xfa, 0x21, 0x3d]), &mut out);
        assert_eq!(
            out,
            [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_encode_length_boundaries() {
        let mut out = Vec::new();
        encode_frame(true, OpCode::Binary, &[0u8; 126], None, &mut out);
        assert_eq!(&out[..4], &[0x82, 126, 0x00, 126]);

        out.clear();
        encode_frame(true, OpCode::Binary, &vec![0u8; 70_000], None, &mut out);
        assert_eq!(out[1], 127);
        assert_eq!(out.len(), 10 + 70_000);
    }

    #[test]
    fn test_close_payload() {
        assert_eq!(encode_close_payload(1000, None), vec![0x03, 0xe8]);
        assert_eq!(encode_close_payload(1000, Some("bye")), b"\x03\xe8bye".to_vec());
        assert!(encode_close_payload(1005, None).is_empty());
        assert!(encode_close_payload(1006, Some("ignored")).is_empty());

        let long = "é".repeat(100);
        let payload = encode_close_payload(1000, Some(&long));
        assert!(payload.len() <= MAX_CONTROL_FRAME_PAYLOAD);
        assert!(std::str::from_utf8(&payload[2..]).is_ok());
    }

    #[test]
    fn test_parse_close_payload() {
        assert_eq!(parse_close_payload(&[]).unwrap(), (1005, None));
        assert_eq!(parse_close_payload(&[0x03, 0xe8]).unwrap(), (1000, None));
        assert_eq!(
            parse_close_payload(b"\x0f\xa1bye").unwrap(),
            (4001, Some("bye".to_string()))
        );
        assert!(parse_close_payload(&[0x03]).is_err());
        assert!(parse_close_payload(&[0x03, 0xee]).is_err()); // 1006
        assert!(parse_close_payload(&[0x03, 0xe8, 0xff]).is_err());
    }
}
