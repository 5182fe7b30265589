use crate::error::AdapterError;
use crate::protocol::canonical::{
    CanonicalResponse, FinishReason, ResponseMessage, ResponseMeta, ToolCall,
};
use crate::protocol::gemini::GeminiResponse;
use crate::protocol::mapping::{gemini_finish_reason, with_tool_calls};
use crate::util::tool_call_id;

/// Map a complete Gemini `generateContent` response to a canonical response.
///
/// Parts of the first candidate are walked in order; reasoning text (signature or
/// `thought: true`) and visible text are concatenated separately, function calls
/// become tool calls, and usage is copied verbatim.
///
/// # Errors
///
/// Returns [`AdapterError::UpstreamProtocol`] when there is no candidate and the
/// prompt was not blocked.
pub fn decode_gemini_response(
    response: &GeminiResponse,
    meta: &ResponseMeta,
) -> Result<CanonicalResponse, AdapterError> {
    let usage = response.usage_metadata.as_ref().map(|usage| usage.to_usage());

    let Some(candidate) = response.candidates.first() else {
        let blocked = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref());
        return match blocked {
            Some(_) => Ok(CanonicalResponse {
                id: meta.id.clone(),
                model: meta.model.clone(),
                created: meta.created,
                message: ResponseMessage::default(),
                finish_reason: FinishReason::ContentFilter,
                usage,
            }),
            None => Err(AdapterError::protocol("Gemini response has no candidates")),
        };
    };

    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    let mut signature = None;

    for part in candidate.parts() {
        if let Some(sig) = part.signature() {
            signature = Some(sig.to_owned());
        }
        if let Some(call) = &part.function_call {
            let id = call
                .id
                .clone()
                .unwrap_or_else(|| tool_call_id(&meta.id, tool_calls.len()));
            tool_calls.push(ToolCall::function(id, call.name.clone(), call.args.to_string()));
            continue;
        }
        if let Some(text) = part.text.as_deref() {
            if part.is_reasoning() {
                reasoning.push_str(text);
            } else {
                content.push_str(text);
            }
        }
    }

    let finish_reason = with_tool_calls(
        candidate
            .finish_reason
            .as_deref()
            .map_or(FinishReason::Stop, gemini_finish_reason),
        !tool_calls.is_empty(),
    );

    Ok(CanonicalResponse {
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
        usage,
    })
}
