use super::canonical::{CanonicalRole, FinishReason};

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn canonical_role_to_anthropic(role: CanonicalRole) -> &'static str {
    match role {
        // System is top-level in Anthropic; tool results travel in user turns.
        CanonicalRole::System | CanonicalRole::User | CanonicalRole::Tool => "user",
        CanonicalRole::Assistant => "assistant",
    }
}

#[must_use]
pub fn canonical_role_to_gemini(role: CanonicalRole) -> &'static str {
    match role {
        // System goes to systemInstruction; functionResponse parts ride in user turns.
        CanonicalRole::System | CanonicalRole::User | CanonicalRole::Tool => "user",
        CanonicalRole::Assistant => "model",
    }
}

// ---------------------------------------------------------------------------
// Finish reason mappings
// ---------------------------------------------------------------------------

/// Gemini `finishReason` to canonical. Unknown values map to `stop`.
#[must_use]
pub fn gemini_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY"
        | "RECITATION"
        | "BLOCKLIST"
        | "PROHIBITED_CONTENT"
        | "SPII"
        | "IMAGE_SAFETY" => FinishReason::ContentFilter,
        "MALFORMED_FUNCTION_CALL" | "UNEXPECTED_TOOL_CALL" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Anthropic `stop_reason` to canonical. Unknown values map to `stop`.
#[must_use]
pub fn anthropic_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" | "model_context_window_exceeded" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// A plain stop becomes `tool_calls` when the turn opened tool calls.
#[must_use]
pub fn with_tool_calls(reason: FinishReason, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls && reason == FinishReason::Stop {
        FinishReason::ToolCalls
    } else {
        reason
    }
}
