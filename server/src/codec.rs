//! Hand-rolled websocket handshake and framing.
//!
//! Outbound frames are always unmasked and final. Inbound frames are
//! decoded from an accumulating buffer: an incomplete frame is left in place
//! until more bytes arrive, so a read that splits a frame never loses data.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::ProtocolError;

pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const MAX_HANDSHAKE_BYTES: usize = 8 * 1024;
pub const MAX_PAYLOAD: usize = 64 * 1024;

pub const OPCODE_CONTINUATION: u8 = 0x0;
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_BINARY: u8 = 0x2;
pub const OPCODE_CLOSE: u8 = 0x8;
pub const OPCODE_PING: u8 = 0x9;
pub const OPCODE_PONG: u8 = 0xA;

pub const BAD_REQUEST_RESPONSE: &str = "HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n";

/// Computes `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub path: String,
    pub key: String,
}

/// Parses an HTTP upgrade request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, or `Ok(None)`
/// while the header block is still incomplete.
pub fn parse_handshake(buf: &[u8]) -> Result<Option<(HandshakeRequest, usize)>, ProtocolError> {
    let end = match buf.windows(4).position(|window| window == b"\r\n\r\n") {
        Some(index) => index + 4,
        None if buf.len() > MAX_HANDSHAKE_BYTES => {
            return Err(ProtocolError::HandshakeTooLarge(MAX_HANDSHAKE_BYTES))
        }
        None => return Ok(None),
    };

    let head = std::str::from_utf8(&buf[..end]).map_err(|_| ProtocolError::MalformedHandshake)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ProtocolError::MalformedHandshake)?;
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return Err(ProtocolError::MalformedHandshake);
    }
    let path = parts
        .next()
        .ok_or(ProtocolError::MalformedHandshake)?
        .to_string();

    let mut is_upgrade = false;
    let mut key = None;
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(ProtocolError::MalformedHandshake)?;
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("upgrade") {
            is_upgrade = value.eq_ignore_ascii_case("websocket");
        } else if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value.to_string());
        }
    }

    if !is_upgrade {
        return Err(ProtocolError::NotUpgrade);
    }
    let key = key
        .filter(|key| !key.is_empty())
        .ok_or(ProtocolError::MissingKey)?;

    Ok(Some((HandshakeRequest { path, key }, end)))
}

pub fn handshake_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(client_key)
    )
}

/// Builds a final, unmasked server frame.
pub fn encode_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);
    frame.push(0x80 | opcode);

    if len < 126 {
        frame.push(len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

pub fn encode_text(payload: &str) -> Vec<u8> {
    encode_frame(OPCODE_TEXT, payload.as_bytes())
}

pub fn ping_frame() -> Vec<u8> {
    encode_frame(OPCODE_PING, &[])
}

pub fn pong_frame(payload: &[u8]) -> Vec<u8> {
    encode_frame(OPCODE_PONG, payload)
}

pub fn close_frame() -> Vec<u8> {
    encode_frame(OPCODE_CLOSE, &[])
}

/// Builds a masked frame the way a browser client sends it.
pub fn encode_client_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut frame = vec![0x80 | opcode];

    let len = payload.len();
    if len < 126 {
        frame.push(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(0x80 | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(&mask);

    let mut body = payload.to_vec();
    apply_mask(&mut body, mask);
    frame.extend_from_slice(&body);
    frame
}

/// XORs each byte with `mask[i % 4]`. Masking and unmasking are the same
/// operation.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong,
    Close,
    /// Binary, continuation and reserved opcodes. Ignored by the server.
    Other(u8),
}

#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_payload: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_payload,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete frame. `Ok(None)` means more bytes are
    /// needed and nothing was consumed.
    ///
    /// A text frame with invalid UTF-8 is consumed and reported as an error;
    /// the stream stays usable. An oversized frame is fatal.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let buf = &self.buffer;
        if buf.len() < 2 {
            return Ok(None);
        }

        let opcode = buf[0] & 0x0F;
        let masked = buf[1] & 0x80 != 0;
        let mut offset = 2;

        let len = match buf[1] & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                offset = 4;
                u16::from_be_bytes([buf[2], buf[3]]) as u64
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                offset = 10;
                let mut extended = [0u8; 8];
                extended.copy_from_slice(&buf[2..10]);
                u64::from_be_bytes(extended)
            }
            short => short as u64,
        };

        if len > self.max_payload as u64 {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let mask = if masked {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let mask = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(mask)
        } else {
            None
        };

        let end = offset + len as usize;
        if buf.len() < end {
            return Ok(None);
        }

        let mut payload = buf[offset..end].to_vec();
        self.buffer.drain(..end);
        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }

        let frame = match opcode {
            OPCODE_TEXT => {
                Frame::Text(String::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?)
            }
            OPCODE_PING => Frame::Ping(payload),
            OPCODE_PONG => Frame::Pong,
            OPCODE_CLOSE => Frame::Close,
            other => Frame::Other(other),
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    #[test]
    fn test_accept_key_known_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_parse_handshake() {
        let request = b"GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let (parsed, used) = parse_handshake(request).unwrap().unwrap();
        assert_eq!(parsed.path, "/ws");
        assert_eq!(parsed.key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(used, request.len());
    }

    #[test]
    fn test_parse_handshake_incomplete() {
        let partial = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n";
        assert!(parse_handshake(partial).unwrap().is_none());
    }

    #[test]
    fn test_parse_handshake_rejections() {
        let not_upgrade = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(matches!(
            parse_handshake(not_upgrade),
            Err(ProtocolError::NotUpgrade)
        ));

        let no_key = b"GET / HTTP/1.1\r\nUpgrade: WebSocket\r\n\r\n";
        assert!(matches!(
            parse_handshake(no_key),
            Err(ProtocolError::MissingKey)
        ));

        let post = b"POST / HTTP/1.1\r\n\r\n";
        assert!(matches!(
            parse_handshake(post),
            Err(ProtocolError::MalformedHandshake)
        ));

        let oversized = vec![b'a'; MAX_HANDSHAKE_BYTES + 1];
        assert!(matches!(
            parse_handshake(&oversized),
            Err(ProtocolError::HandshakeTooLarge(_))
        ));
    }

    #[test]
    fn test_handshake_response() {
        let response = handshake_response("dGhlIHNhbXBsZSBub25jZQ==");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_length_boundaries() {
        let short = encode_text(&"a".repeat(125));
        assert_eq!(short[0], 0x81);
        assert_eq!(short[1], 125);
        assert_eq!(short.len(), 2 + 125);

        let medium = encode_text(&"a".repeat(126));
        assert_eq!(medium[1], 126);
        assert_eq!(u16::from_be_bytes([medium[2], medium[3]]), 126);
        assert_eq!(medium.len(), 4 + 126);

        let medium_plus = encode_text(&"a".repeat(127));
        assert_eq!(medium_plus[1], 126);
        assert_eq!(u16::from_be_bytes([medium_plus[2], medium_plus[3]]), 127);

        let large = encode_text(&"a".repeat(70_000));
        assert_eq!(large[1], 127);
        assert_eq!(large.len(), 10 + 70_000);
    }

    #[test]
    fn test_ping_frame() {
        assert_eq!(ping_frame(), vec![0x89, 0x00]);
    }

    #[test]
    fn test_decode_masked_boundaries() {
        for len in [0usize, 1, 125, 126, 127, 300] {
            let text = "x".repeat(len);
            let mut decoder = FrameDecoder::new();
            decoder.extend(&encode_client_frame(OPCODE_TEXT, text.as_bytes(), MASK));
            assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Text(text)));
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn test_partial_frame_not_consumed() {
        let frame = encode_client_frame(OPCODE_TEXT, br#"{"type":"requestPoints"}"#, MASK);
        let mut decoder = FrameDecoder::new();

        for (i, byte) in frame.iter().enumerate() {
            decoder.extend(&[*byte]);
            if i + 1 < frame.len() {
                assert_eq!(decoder.next_frame().unwrap(), None);
                assert_eq!(decoder.buffered(), i + 1);
            }
        }

        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Text(r#"{"type":"requestPoints"}"#.to_string()))
        );
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut bytes = encode_client_frame(OPCODE_PONG, &[], MASK);
        bytes.extend(encode_client_frame(OPCODE_TEXT, b"hello", MASK));
        bytes.extend(encode_client_frame(OPCODE_BINARY, b"\x01\x02", MASK));

        let mut decoder = FrameDecoder::new();
        decoder.extend(&bytes);
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Pong));
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Text("hello".to_string()))
        );
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Other(OPCODE_BINARY))
        );
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_unmasked_frame_accepted() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_text("plain"));
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Text("plain".to_string()))
        );
    }

    #[test]
    fn test_ping_and_close() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_client_frame(OPCODE_PING, b"hb", MASK));
        decoder.extend(&encode_client_frame(OPCODE_CLOSE, &[], MASK));
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Ping(b"hb".to_vec()))
        );
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Close));
    }

    #[test]
    fn test_invalid_utf8_consumed() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_client_frame(OPCODE_TEXT, &[0xff, 0xfe], MASK));
        decoder.extend(&encode_client_frame(OPCODE_TEXT, b"ok", MASK));

        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::InvalidUtf8)
        ));
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Text("ok".to_string()))
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::with_max_payload(16);
        decoder.extend(&encode_client_frame(OPCODE_TEXT, &[b'a'; 17], MASK));
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::FrameTooLarge { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_mask_is_involution() {
        let mut data = b"bomberman".to_vec();
        apply_mask(&mut data, MASK);
        assert_ne!(data, b"bomberman".to_vec());
        apply_mask(&mut data, MASK);
        assert_eq!(data, b"bomberman".to_vec());
    }
}
