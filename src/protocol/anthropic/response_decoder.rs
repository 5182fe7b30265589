use crate::error::AdapterError;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicResponse};
use crate::protocol::canonical::{
    CanonicalResponse, FinishReason, ResponseMessage, ResponseMeta, ToolCall, Usage,
};
use crate::protocol::mapping::{anthropic_stop_reason, with_tool_calls};

/// Parse and map a complete Anthropic Messages response body.
///
/// # Errors
///
/// Returns [`AdapterError::UpstreamProtocol`] when the body is not a Messages response.
pub fn decode_anthropic_response_body(
    body: &[u8],
    meta: &ResponseMeta,
) -> Result<CanonicalResponse, AdapterError> {
    let response: AnthropicResponse = serde_json::from_slice(body)
        .map_err(|e| AdapterError::protocol(format!("invalid Anthropic response: {e}")))?;
    Ok(decode_anthropic_response(&response, meta))
}

/// Map an Anthropic Messages response to a canonical response.
#[must_use]
pub fn decode_anthropic_response(
    response: &AnthropicResponse,
    meta: &ResponseMeta,
) -> CanonicalResponse {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut signature = None;

    for block in &response.content {
        match block {
            AnthropicContentBlock::Text { text } => content.push_str(text),
            AnthropicContentBlock::Thinking {
                thinking,
                signature: block_signature,
            } => {
                reasoning.push_str(thinking);
                if let Some(sig) = block_signature.as_deref().filter(|s| !s.is_empty()) {
                    signature = Some(sig.to_owned());
                }
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id.clone(), name.clone(), input.to_string()));
            }
            _ => {}
        }
    }

    let finish_reason = with_tool_calls(
        response
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Stop, anthropic_stop_reason),
        !tool_calls.is_empty(),
    );
    let usage = Usage::from_counts(
        response.usage.input_tokens,
        response.usage.output_tokens,
        None,
        None,
    );

    CanonicalResponse {
        id: meta.id.clone(),
        model: meta.model.clone(),
        created: meta.created,
        message: ResponseMessage {
            content: (!content.is_empty()).then_some(content),
            reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls,
            reasoning_signature: signature,
        },
        finish_reason,
        usage: Some(usage),
    }
}
