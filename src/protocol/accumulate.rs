//! Folds a canonical chunk sequence into one canonical response.

use crate::protocol::canonical::{
    CanonicalChunk, CanonicalResponse, FinishReason, ResponseMessage, ResponseMeta, ToolCall,
    Usage,
};
use crate::protocol::mapping::with_tool_calls;

#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    content: String,
    reasoning: String,
    /// Indexed by the delta `index`.
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    signature: Option<String>,
}

impl ChunkAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &CanonicalChunk) {
        if let Some(text) = chunk.content.as_deref() {
            self.content.push_str(text);
        }
        if let Some(text) = chunk.reasoning_content.as_deref() {
            self.reasoning.push_str(text);
        }
        for delta in chunk.tool_calls.iter().flatten() {
            while self.tool_calls.len() <= delta.index {
                self.tool_calls.push(ToolCall::function(String::new(), String::new(), String::new()));
            }
            let call = &mut self.tool_calls[delta.index];
            if let Some(id) = &delta.id {
                call.id.clone_from(id);
            }
            if let Some(name) = &delta.function.name {
                call.function.name.push_str(name);
            }
            if let Some(arguments) = &delta.function.arguments {
                call.function.arguments.push_str(arguments);
            }
        }
        if let Some(reason) = chunk.finish_reason {
            self.finish_reason = Some(reason);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        if let Some(signature) = &chunk.reasoning_signature {
            self.signature = Some(signature.clone());
        }
    }

    pub fn extend<'a>(&mut self, chunks: impl IntoIterator<Item = &'a CanonicalChunk>) {
        for chunk in chunks {
            self.push(chunk);
        }
    }

    #[must_use]
    pub fn into_response(self, meta: &ResponseMeta) -> CanonicalResponse {
        let finish_reason = with_tool_calls(
            self.finish_reason.unwrap_or(FinishReason::Stop),
            !self.tool_calls.is_empty(),
        );
        CanonicalResponse {
            id: meta.id.clone(),
            model: meta.model.clone(),
            created: meta.created,
            message: ResponseMessage {
                content: (!self.content.is_empty()).then_some(self.content),
                reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
                tool_calls: self.tool_calls,
                reasoning_signature: self.signature,
            },
            finish_reason,
            usage: self.usage,
        }
    }
}
