use rustc_hash::FxHashMap;
use tracing::debug;

use crate::adapter::StreamDecoder;
use crate::error::AdapterError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent,
};
use crate::protocol::canonical::{
    CanonicalChunk, FinishReason, StreamState, ToolCallDelta, Usage,
};
use crate::protocol::mapping::anthropic_stop_reason;
use crate::stream::sse::{SseByteDecoder, SseEvent};
use crate::util::extract_sse_data_payload;

/// Decoder for Anthropic Messages SSE (`message_start` ... `message_stop`).
pub struct AnthropicStreamDecoder {
    state: StreamState,
    sse: SseByteDecoder,
    events: Vec<SseEvent>,
    /// Content block index -> canonical tool call index.
    tool_blocks: FxHashMap<usize, usize>,
    input_tokens: u64,
    message_stopped: bool,
}

impl AnthropicStreamDecoder {
    #[must_use]
    pub fn new(state: StreamState) -> Self {
        Self {
            state,
            sse: SseByteDecoder::new(),
            events: Vec::with_capacity(4),
            tool_blocks: FxHashMap::default(),
            input_tokens: 0,
            message_stopped: false,
        }
    }

    /// Decode one upstream event into canonical chunks.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] for an `error` event.
    pub fn decode_event_into(
        &mut self,
        event: AnthropicStreamEvent,
        out: &mut Vec<CanonicalChunk>,
    ) -> Result<(), AdapterError> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens;
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => self.decode_block_start(index, content_block, out),
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
                self.decode_delta(index, delta, out);
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if self.state.is_done() {
                    return Ok(());
                }
                if let Some(reason) = delta.stop_reason.as_deref() {
                    let usage = usage.map(|usage| {
                        Usage::from_counts(
                            usage.input_tokens.unwrap_or(self.input_tokens),
                            usage.output_tokens.unwrap_or(0),
                            None,
                            None,
                        )
                    });
                    out.push(self.state.finish_chunk(anthropic_stop_reason(reason), usage));
                }
            }
            AnthropicStreamEvent::MessageStop => {
                self.message_stopped = true;
                if !self.state.is_done() {
                    debug!("Anthropic message_stop without stop_reason");
                    out.push(self.state.finish_chunk(FinishReason::Stop, None));
                }
            }
            AnthropicStreamEvent::Error { error } => {
                return Err(AdapterError::UpstreamProtocol {
                    status: error.status(),
                    message: format!("{}: {}", error.kind, error.message),
                });
            }
            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Unknown => {}
        }
        Ok(())
    }

    fn decode_block_start(
        &mut self,
        index: usize,
        block: AnthropicContentBlock,
        out: &mut Vec<CanonicalChunk>,
    ) {
        match block {
            AnthropicContentBlock::Text { text } => {
                if !text.is_empty() {
                    out.push(self.state.content_chunk(text));
                }
            }
            AnthropicContentBlock::Thinking {
                thinking,
                signature,
            } => {
                if let Some(signature) = signature.as_deref() {
                    self.state.record_signature(signature);
                }
                if !thinking.is_empty() {
                    out.push(self.state.reasoning_chunk(thinking));
                }
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let tool_index = self.state.open_tool_call();
                self.tool_blocks.insert(index, tool_index);
                // Input streams through input_json_delta; a non-empty start object is kept.
                let initial = match &input {
                    serde_json::Value::Object(map) if !map.is_empty() => Some(input.to_string()),
                    _ => None,
                };
                let delta = ToolCallDelta::open(tool_index, id, name, initial);
                out.push(self.state.tool_call_chunk(delta));
            }
            _ => {}
        }
    }

    fn decode_delta(&mut self, index: usize, delta: AnthropicDelta, out: &mut Vec<CanonicalChunk>) {
        match delta {
            AnthropicDelta::TextDelta { text } => {
                if !text.is_empty() {
                    out.push(self.state.content_chunk(text));
                }
            }
            AnthropicDelta::ThinkingDelta { thinking } => {
                if !thinking.is_empty() {
                    out.push(self.state.reasoning_chunk(thinking));
                }
            }
            AnthropicDelta::SignatureDelta { signature } => {
                self.state.record_signature(&signature);
            }
            AnthropicDelta::InputJsonDelta { partial_json } => {
                if partial_json.is_empty() {
                    return;
                }
                if let Some(&tool_index) = self.tool_blocks.get(&index) {
                    out.push(
                        self.state
                            .tool_call_chunk(ToolCallDelta::arguments(tool_index, partial_json)),
                    );
                }
            }
            AnthropicDelta::Unknown => {}
        }
    }

    fn drain_events(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        let mut events = std::mem::take(&mut self.events);
        let result = events.drain(..).try_for_each(|event| {
            if self.message_stopped {
                return Ok(());
            }
            let Some(payload) = extract_sse_data_payload(&event.data) else {
                return Ok(());
            };
            let parsed: AnthropicStreamEvent = serde_json::from_str(payload).map_err(|e| {
                AdapterError::protocol(format!("invalid Anthropic stream event: {e}"))
            })?;
            self.decode_event_into(parsed, out)
        });
        self.events = events;
        result
    }
}

impl StreamDecoder for AnthropicStreamDecoder {
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        self.sse.feed_into(bytes, &mut self.events);
        self.drain_events(out)
    }

    fn finish(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        self.sse.finish_into(&mut self.events);
        self.drain_events(out)?;
        if !self.state.is_done() {
            return Err(AdapterError::protocol(
                "Anthropic stream ended before message_stop",
            ));
        }
        Ok(())
    }

    fn state(&self) -> &StreamState {
        &self.state
    }
}
