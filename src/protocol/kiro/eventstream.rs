//! AWS event-stream binary framing.
//!
//! ```text
//! [total_len u32][headers_len u32][prelude_crc u32][headers][payload][message_crc u32]
//! ```
//!
//! Integers are big-endian. CRCs are carried but not verified; the body arrives
//! over TLS and a corrupted frame fails JSON decoding anyway.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::AdapterError;

const PRELUDE_LEN: usize = 12;
const TRAILER_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + TRAILER_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TYPE_BOOL_TRUE: u8 = 0;
const TYPE_BOOL_FALSE: u8 = 1;
const TYPE_BYTE: u8 = 2;
const TYPE_SHORT: u8 = 3;
const TYPE_INT: u8 = 4;
const TYPE_LONG: u8 = 5;
const TYPE_BYTES: u8 = 6;
const TYPE_STRING: u8 = 7;
const TYPE_TIMESTAMP: u8 = 8;
const TYPE_UUID: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Bytes,
}

impl EventFrame {
    /// String value of a header, if present and string-typed.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(key, value)| match value {
            HeaderValue::String(s) if key == name => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Incremental frame splitter. Frames may be cut at any byte boundary.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: BytesMut,
}

impl EventStreamParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and push every completed frame to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] when a prelude or header block is malformed.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<EventFrame>) -> Result<(), AdapterError> {
        self.buffer.extend_from_slice(bytes);
        while self.buffer.len() >= PRELUDE_LEN {
            let total_len = read_u32(&self.buffer[0..4]) as usize;
            let headers_len = read_u32(&self.buffer[4..8]) as usize;
            if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
                || headers_len > total_len - MIN_FRAME_LEN
            {
                return Err(AdapterError::protocol(format!(
                    "invalid event-stream prelude (total {total_len}, headers {headers_len})"
                )));
            }
            if self.buffer.len() < total_len {
                break;
            }
            let frame = self.buffer.split_to(total_len).freeze();
            out.push(parse_frame(frame, headers_len)?);
        }
        Ok(())
    }

    /// Bytes buffered but not yet forming a complete frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Upstream EOF.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] when a partial frame is left over.
    pub fn finish(&mut self) -> Result<(), AdapterError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(AdapterError::protocol(format!(
                "event stream truncated: {} trailing bytes",
                self.buffer.len()
            )))
        }
    }
}

/// Encode one frame with string headers. CRC fields are written as zero.
#[must_use]
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut header_block = BytesMut::new();
    for (name, value) in headers {
        header_block.put_u8(u8::try_from(name.len()).unwrap_or(u8::MAX));
        header_block.put_slice(&name.as_bytes()[..name.len().min(usize::from(u8::MAX))]);
        header_block.put_u8(TYPE_STRING);
        let value_len = value.len().min(usize::from(u16::MAX));
        header_block.put_u16(u16::try_from(value_len).unwrap_or(u16::MAX));
        header_block.put_slice(&value.as_bytes()[..value_len]);
    }
    let total = MIN_FRAME_LEN + header_block.len() + payload.len();
    let mut frame = BytesMut::with_capacity(total);
    frame.put_u32(u32::try_from(total).unwrap_or(u32::MAX));
    frame.put_u32(u32::try_from(header_block.len()).unwrap_or(u32::MAX));
    frame.put_u32(0);
    frame.put_slice(&header_block);
    frame.put_slice(payload);
    frame.put_u32(0);
    frame.freeze()
}

/// Convenience for a Kiro-style `event` frame.
#[must_use]
pub fn encode_event(event_type: &str, payload: &[u8]) -> Bytes {
    encode_frame(
        &[
            (":message-type", "event"),
            (":event-type", event_type),
            (":content-type", "application/json"),
        ],
        payload,
    )
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

fn parse_frame(mut frame: Bytes, headers_len: usize) -> Result<EventFrame, AdapterError> {
    let total_len = frame.len();
    frame.advance(PRELUDE_LEN);
    let header_block = frame.split_to(headers_len);
    let payload = frame.split_to(total_len - MIN_FRAME_LEN - headers_len);
    Ok(EventFrame {
        headers: parse_headers(header_block)?,
        payload,
    })
}

fn need(buf: &Bytes, len: usize) -> Result<(), AdapterError> {
    if buf.remaining() < len {
        return Err(AdapterError::protocol("event-stream header block truncated"));
    }
    Ok(())
}

/// u16 length prefix followed by that many bytes.
fn take_sized(buf: &mut Bytes) -> Result<Bytes, AdapterError> {
    need(buf, 2)?;
    let len = usize::from(buf.get_u16());
    need(buf, len)?;
    Ok(buf.split_to(len))
}

fn parse_headers(mut buf: Bytes) -> Result<Vec<(String, HeaderValue)>, AdapterError> {
    let mut headers = Vec::with_capacity(3);
    while buf.has_remaining() {
        let name_len = usize::from(buf.get_u8());
        need(&buf, name_len + 1)?;
        let name = String::from_utf8(buf.split_to(name_len).to_vec())
            .map_err(|_| AdapterError::protocol("event-stream header name is not UTF-8"))?;
        let value = match buf.get_u8() {
            TYPE_BOOL_TRUE => HeaderValue::Bool(true),
            TYPE_BOOL_FALSE => HeaderValue::Bool(false),
            TYPE_BYTE => {
                need(&buf, 1)?;
                HeaderValue::Byte(buf.get_i8())
            }
            TYPE_SHORT => {
                need(&buf, 2)?;
                HeaderValue::Short(buf.get_i16())
            }
            TYPE_INT => {
                need(&buf, 4)?;
                HeaderValue::Int(buf.get_i32())
            }
            TYPE_LONG => {
                need(&buf, 8)?;
                HeaderValue::Long(buf.get_i64())
            }
            TYPE_TIMESTAMP => {
                need(&buf, 8)?;
                HeaderValue::Timestamp(buf.get_i64())
            }
            TYPE_BYTES => HeaderValue::Bytes(take_sized(&mut buf)?),
            TYPE_STRING => {
                let raw = take_sized(&mut buf)?;
                HeaderValue::String(
                    String::from_utf8(raw.to_vec())
                        .map_err(|_| AdapterError::protocol("event-stream header value is not UTF-8"))?,
                )
            }
            TYPE_UUID => {
                need(&buf, 16)?;
                let mut uuid = [0u8; 16];
                buf.copy_to_slice(&mut uuid);
                HeaderValue::Uuid(uuid)
            }
            other => {
                return Err(AdapterError::protocol(format!(
                    "unknown event-stream header type {other}"
                )))
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip_headers() {
        let bytes = encode_event("assistantResponseEvent", br#"{"content":"Hi"}"#);
        let mut parser = EventStreamParser::new();
        let mut frames = Vec::new();
        parser.feed(&bytes, &mut frames).unwrap();
        parser.finish().unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header(":event-type"), Some("assistantResponseEvent"));
        assert_eq!(frames[0].header(":message-type"), Some("event"));
        assert_eq!(&frames[0].payload[..], br#"{"content":"Hi"}"#);
    }

    #[test]
    fn test_arbitrary_split_points() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&encode_event("assistantResponseEvent", br#"{"content":"a"}"#));
        body.extend_from_slice(&encode_event("toolUseEvent", br#"{"name":"f","toolUseId":"t","input":"{}"}"#));
        body.extend_from_slice(&encode_frame(&[], b""));
        let body = body.freeze();

        let mut whole = Vec::new();
        EventStreamParser::new().feed(&body, &mut whole).unwrap();
        assert_eq!(whole.len(), 3);

        for step in [1, 2, 3, 7, 13, 64] {
            let mut parser = EventStreamParser::new();
            let mut frames = Vec::new();
            for piece in body.chunks(step) {
                parser.feed(piece, &mut frames).unwrap();
            }
            parser.finish().unwrap();
            assert_eq!(frames, whole, "split step {step}");
        }
    }

    #[test]
    fn test_non_string_headers() {
        let mut header_block = BytesMut::new();
        header_block.put_u8(4);
        header_block.put_slice(b"flag");
        header_block.put_u8(TYPE_BOOL_TRUE);
        header_block.put_u8(2);
        header_block.put_slice(b"id");
        header_block.put_u8(TYPE_UUID);
        header_block.put_slice(&[7u8; 16]);
        header_block.put_u8(1);
        header_block.put_slice(b"n");
        header_block.put_u8(TYPE_INT);
        header_block.put_i32(-5);

        let total = MIN_FRAME_LEN + header_block.len();
        let mut frame = BytesMut::new();
        frame.put_u32(total as u32);
        frame.put_u32(header_block.len() as u32);
        frame.put_u32(0);
        frame.put_slice(&header_block);
        frame.put_u32(0);

        let mut frames = Vec::new();
        EventStreamParser::new().feed(&frame, &mut frames).unwrap();
        let headers = &frames[0].headers;
        assert_eq!(headers[0], ("flag".to_string(), HeaderValue::Bool(true)));
        assert_eq!(headers[1], ("id".to_string(), HeaderValue::Uuid([7u8; 16])));
        assert_eq!(headers[2], ("n".to_string(), HeaderValue::Int(-5)));
        assert_eq!(frames[0].header("flag"), None);
    }

    #[test]
    fn test_truncated_frame_at_eof() {
        let bytes = encode_event("assistantResponseEvent", br#"{"content":"Hi"}"#);
        let mut parser = EventStreamParser::new();
        let mut frames = Vec::new();
        parser.feed(&bytes[..bytes.len() - 3], &mut frames).unwrap();
        assert!(frames.is_empty());
        assert_eq!(parser.pending(), bytes.len() - 3);
        assert!(parser.finish().is_err());
    }

    #[test]
    fn test_bad_prelude() {
        let mut parser = EventStreamParser::new();
        let mut frames = Vec::new();
        let err = parser
            .feed(&[0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0], &mut frames)
            .unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamProtocol { .. }));
    }
}
