use crate::error::AdapterError;
use crate::protocol::canonical::{CanonicalChunk, CanonicalResponse, StreamState, Usage};

use super::{
    ChatChoice, ChatCompletion, ChatCompletionChunk, ChunkChoice, ChunkDelta,
    CompletionTokensDetails, WireMessage, WireUsage, CHAT_COMPLETION_CHUNK_OBJECT,
    CHAT_COMPLETION_OBJECT,
};

impl From<Usage> for WireUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            thoughts_tokens: usage.thoughts_tokens,
            completion_tokens_details: usage
                .thoughts_tokens
                .map(|reasoning_tokens| CompletionTokensDetails { reasoning_tokens }),
        }
    }
}

/// Build the `chat.completion.chunk` envelope for one canonical chunk.
#[must_use]
pub fn chunk_envelope<'a>(chunk: &'a CanonicalChunk, state: &'a StreamState) -> ChatCompletionChunk<'a> {
    let content = match (&chunk.content, &chunk.reasoning_content) {
        (Some(text), _) => Some(Some(text.as_str())),
        (None, Some(_)) => Some(None),
        (None, None) => None,
    };
    ChatCompletionChunk {
        id: &state.id,
        object: CHAT_COMPLETION_CHUNK_OBJECT,
        created: state.created,
        model: &state.model,
        choices: [ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: chunk.role.map(|role| role.as_str()),
                content,
                reasoning_content: chunk.reasoning_content.as_deref(),
                tool_calls: chunk.tool_calls.as_deref(),
                reasoning_signature: chunk.reasoning_signature.as_deref(),
            },
            finish_reason: chunk.finish_reason.map(|reason| reason.as_str()),
        }],
        usage: chunk.usage.map(WireUsage::from),
    }
}

/// Serialize one canonical chunk as the JSON text of an SSE `data:` line.
///
/// # Errors
///
/// Returns [`AdapterError::Internal`] if serialization fails.
pub fn encode_chunk(chunk: &CanonicalChunk, state: &StreamState) -> Result<String, AdapterError> {
    serde_json::to_string(&chunk_envelope(chunk, state))
        .map_err(|e| AdapterError::Internal(format!("failed to encode chunk: {e}")))
}

/// Encode a canonical response as a `chat.completion` body.
#[must_use]
pub fn encode_response(response: &CanonicalResponse) -> ChatCompletion {
    ChatCompletion {
        id: response.id.clone(),
        object: CHAT_COMPLETION_OBJECT,
        created: response.created,
        model: response.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: WireMessage {
                role: "assistant",
                content: response.message.content.clone(),
                reasoning_content: response.message.reasoning_content.clone(),
                tool_calls: response.message.tool_calls.clone(),
                reasoning_signature: response.message.reasoning_signature.clone(),
            },
            finish_reason: response.finish_reason.as_str(),
        }],
        usage: response.usage.map(WireUsage::from),
    }
}
