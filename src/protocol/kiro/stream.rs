use rustc_hash::FxHashMap;
use tracing::debug;

use crate::adapter::StreamDecoder;
use crate::error::AdapterError;
use crate::observability::token_counter::tokens_for_len;
use crate::protocol::canonical::{CanonicalChunk, FinishReason, StreamState, ToolCallDelta, Usage};
use crate::protocol::kiro::eventstream::{EventFrame, EventStreamParser};
use crate::protocol::kiro::{KiroEvent, KiroReasoningContentEvent, KiroTokenUsage, KiroToolUseEvent};

/// Decoder for the Kiro event-stream body.
///
/// Kiro sends no finish event, so the terminal chunk is produced in
/// [`StreamDecoder::finish`]. Without an explicit usage event, usage is
/// estimated from the request estimate and the emitted text.
pub struct KiroStreamDecoder {
    state: StreamState,
    parser: EventStreamParser,
    frames: Vec<EventFrame>,
    /// `toolUseId` -> canonical tool call index.
    tool_calls: FxHashMap<String, usize>,
    usage: Option<KiroTokenUsage>,
    emitted_bytes: usize,
}

impl KiroStreamDecoder {
    #[must_use]
    pub fn new(state: StreamState) -> Self {
        Self {
            state,
            parser: EventStreamParser::new(),
            frames: Vec::with_capacity(4),
            tool_calls: FxHashMap::default(),
            usage: None,
            emitted_bytes: 0,
        }
    }

    fn decode_event(&mut self, event: KiroEvent, out: &mut Vec<CanonicalChunk>) {
        match event {
            KiroEvent::AssistantResponse(event) => {
                if !event.content.is_empty() {
                    self.emitted_bytes += event.content.len();
                    out.push(self.state.content_chunk(event.content));
                }
            }
            KiroEvent::Reasoning(KiroReasoningContentEvent { text, signature }) => {
                if let Some(signature) = signature.as_deref() {
                    self.state.record_signature(signature);
                }
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    self.emitted_bytes += text.len();
                    out.push(self.state.reasoning_chunk(text));
                }
            }
            KiroEvent::ToolUse(event) => self.decode_tool_use(event, out),
            KiroEvent::Usage(usage) => self.usage = Some(usage),
            KiroEvent::Ignored => {}
        }
    }

    fn decode_tool_use(&mut self, event: KiroToolUseEvent, out: &mut Vec<CanonicalChunk>) {
        let input = event.input.filter(|input| !input.is_empty());
        if let Some(input) = &input {
            self.emitted_bytes += input.len();
        }
        match self.tool_calls.get(&event.tool_use_id) {
            Some(&index) => {
                if let Some(input) = input {
                    out.push(self.state.tool_call_chunk(ToolCallDelta::arguments(index, input)));
                }
            }
            None => {
                let index = self.state.open_tool_call();
                self.tool_calls.insert(event.tool_use_id.clone(), index);
                self.emitted_bytes += event.name.len();
                let delta = ToolCallDelta::open(index, event.tool_use_id, event.name, input);
                out.push(self.state.tool_call_chunk(delta));
            }
        }
        if event.stop {
            debug!("Kiro tool use complete");
        }
    }

    fn drain_frames(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        let mut frames = std::mem::take(&mut self.frames);
        let result = frames.drain(..).try_for_each(|frame| {
            let event = KiroEvent::from_frame(&frame)?;
            self.decode_event(event, out);
            Ok(())
        });
        self.frames = frames;
        result
    }

    fn final_usage(&self) -> Usage {
        match self.usage {
            Some(usage) => Usage::from_counts(usage.input_tokens, usage.output_tokens, None, None),
            None => Usage::from_counts(
                self.state.prompt_tokens_estimate,
                tokens_for_len(self.emitted_bytes),
                None,
                None,
            ),
        }
    }
}

impl StreamDecoder for KiroStreamDecoder {
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        if self.state.is_done() {
            return Ok(());
        }
        self.parser.feed(bytes, &mut self.frames)?;
        self.drain_frames(out)
    }

    fn finish(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError> {
        if self.state.is_done() {
            return Ok(());
        }
        self.parser.finish()?;
        let reason = if self.state.has_tool_calls() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        let usage = self.final_usage();
        out.push(self.state.finish_chunk(reason, Some(usage)));
        Ok(())
    }

    fn state(&self) -> &StreamState {
        &self.state
    }
}
