/// SSE (Server-Sent Events) frame parser and encoder.
///
/// Handles the low-level parsing of SSE frames from a byte stream,
/// including buffering partial lines and handling field semantics per the
/// [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use memchr::memchr_iter;

use crate::error::AdapterError;

/// A parsed SSE frame from the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

// ---------------------------------------------------------------------------
// SseParser — incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (potentially arriving in arbitrary byte
/// boundaries) and it yields fully-assembled [`SseEvent`] frames.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    ///
    /// - `event:` sets the event type for the next frame
    /// - `data:` appends to the data buffer (one leading space stripped);
    ///   multiple `data:` lines are joined with `\n`
    /// - an empty line terminates a frame
    /// - `:` comments, `id:`, `retry:` and unknown fields are ignored
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Treat end of input as a line and frame terminator.
    pub fn flush_into(&mut self, out: &mut Vec<SseEvent>) {
        if self.read_offset < self.buffer.len() {
            let rest = self.buffer[self.read_offset..].to_owned();
            let line = rest.strip_suffix('\r').unwrap_or(&rest);
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
        }
        self.buffer.clear();
        self.read_offset = 0;
        Self::process_line(
            "",
            &mut self.event_type,
            &mut self.data_buffer,
            &mut self.has_data,
            out,
        );
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            // Empty line = dispatch event
            if *has_data {
                events.push(SseEvent {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            } else {
                *event_type = None;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// SseByteDecoder — bytes to events, UTF-8 safe across chunk boundaries
// ---------------------------------------------------------------------------

/// Byte-level front end for [`SseParser`].
///
/// A multi-byte character split across network chunks is held back until its
/// remaining bytes arrive; invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct SseByteDecoder {
    parser: SseParser,
    remainder: Vec<u8>,
}

impl SseByteDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_into(&mut self, bytes: &[u8], out: &mut Vec<SseEvent>) {
        if self.remainder.is_empty() {
            if let Ok(text) = std::str::from_utf8(bytes) {
                self.parser.feed_into(text, out);
                return;
            }
        }
        self.remainder.extend_from_slice(bytes);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.remainder[start..]) {
                Ok(text) => {
                    self.parser.feed_into(text, out);
                    start = self.remainder.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.remainder[start..valid_end]) {
                        self.parser.feed_into(text, out);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.parser.feed_into("\u{FFFD}", out);
                            start = valid_end + invalid_len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.remainder.drain(..start);
    }

    /// Flush at end of input; a dangling partial character becomes U+FFFD.
    pub fn finish_into(&mut self, out: &mut Vec<SseEvent>) {
        if !self.remainder.is_empty() {
            let tail = String::from_utf8_lossy(&self.remainder).into_owned();
            self.remainder.clear();
            self.parser.feed_into(&tail, out);
        }
        self.parser.flush_into(out);
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Format a `[DONE]` frame as SSE text.
#[must_use]
pub fn done_frame() -> &'static str {
    DONE_FRAME
}

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

/// Terminal error event for a stream that cannot complete.
#[must_use]
pub fn error_frame(err: &AdapterError) -> String {
    openai_sse_frame(&err.error_payload().to_string())
}
