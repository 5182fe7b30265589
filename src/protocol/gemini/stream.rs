use tracing::debug;

use crate::adapter::StreamDecoder;
use crate::error::AdapterError;
use crate::protocol::canonical::{CanonicalChunk, FinishReason, StreamState, ToolCallDelta};
use crate::protocol::gemini::{parse_gemini_payload, GeminiPart, GeminiResponse};
use crate::protocol::mapping::{gemini_finish_reason, with_tool_calls};
use crate::stream::sse::{SseByteDecoder, SseEvent};
use crate::util::{extract_sse_data_payload, tool_call_id};

/// Decoder for `streamGenerateContent?alt=sse`.
///
/// Each SSE event is one `GeminiResponse`. Text parts with a thought signature
/// (or `thought: true`) become `reasoning_content`, other text becomes
/// `content`, and the first `finishReason` ends the stream.
pub struct GeminiStreamDecoder {
    state: StreamState,
    sse: SseByteDecoder,
    events: Vec<SseEvent>,
}

impl GeminiStreamDecoder {
    #[must_use]
    pub fn new(state: StreamState) -> Self {
        Self {
            state,
            sse: SseByteDecoder::new(),
            events: Vec::with_capacity(4),
        }
    }

    /// Decode one upstream event into canonical chunks.
    pub fn decode_event_into(&mut self, event: &GeminiResponse, out: &mut Vec<CanonicalChunk>) {
        if self.state.is_done() {
            return;
        }
        let emitted_before = out.len();

        if let Some(candidate) = event.candidates.first() {
            for part in candidate.parts() {
                self.decode_part_into(part, out);
            }
            if let Some(reason) = candidate.finish_reason.as_deref() {
                let finish = with_tool_calls(gemini_finish_reason(reason), self.state.has_tool_calls());
                let usage = event.usage_metadata.as_ref().map(|usage| usage.to_usage());
                out.push(self.state.finish_chunk(finish, usage));
                return;
            }
        } else if let Some(reason) = event
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            debug!("Gemini blocked the prompt: {}", reason);
            let usage = event.usage_metadata.as_ref().map(|usage| usage.to_usage());
            out.push(self.state.finish_chunk(FinishReason::ContentFilter, usage));
            return;
        }

        // An event without text still opens the stream with the role.
        if out.len() == emitted_before && !self.state.role_emitted {
            out.push(self.state.chunk());
        }
    }

    fn decode_part_into(&mut self, part: &GeminiPart, out: &mut Vec<CanonicalChunk>) {
        if let Some(signature) = part.signature() {
            self.state.record_signature(signature);
        }
        if let Some(call) = &part.function_call {
            let index = self.state.open_tool_call();
            let id = call
                .id
                .clone()
                .unwrap_or_else(|| tool_call_id(&self.state.id, index));
            let delta = ToolCallDelta::open(index, id, call.name.clone(), Some(call.args.to_string()));
            out.push(self.state.tool_call_chunk(delta));
            return;
        }
        match part.text.as_deref() {
            Some(text) if !text.is_empty() => {
                let chunk = if part.is_reasoning() {
                    self.state.reasoning_chunk(text)
                } else {
                    self.state.content_chunk(text)
                };
                out.push(chunk);
            }
            _ => {}
        }
    }

    fn drain_events(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        let mut events = std::mem::take(&mut self.events);
        let result = events.iter().try_for_each(|event| {
            if self.state.is_done() {
                return Ok(());
            }
            let Some(payload) = extract_sse_data_payload(&event.data) else {
                return Ok(());
            };
            let response = parse_gemini_payload(payload.as_bytes())?;
            self.decode_event_into(&response, out);
            Ok(())
        });
        events.clear();
        self.events = events;
        result
    }
}

impl StreamDecoder for GeminiStreamDecoder {
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        self.sse.feed_into(bytes, &mut self.events);
        self.drain_events(out)
    }

    fn finish(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        self.sse.finish_into(&mut self.events);
        self.drain_events(out)?;
        if !self.state.is_done() {
            return Err(AdapterError::protocol(
                "Gemini stream ended before a finish reason",
            ));
        }
        Ok(())
    }

    fn state(&self) -> &StreamState {
        &self.state
    }
}
