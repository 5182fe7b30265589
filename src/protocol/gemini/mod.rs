pub mod encoder;
pub mod response_decoder;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, PROTOCOL_FAULT_STATUS};
use crate::protocol::canonical::Usage;

/// Gemini v1beta generateContent request wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiToolDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GeminiToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

/// A content message in Gemini format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// A single part within a Gemini content message.
///
/// Gemini puts `thought` and `thoughtSignature` next to the payload field, so a
/// part is a flat struct with one payload set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(
        default,
        alias = "thought_signature",
        skip_serializing_if = "Option::is_none"
    )]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GeminiBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<GeminiFileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Non-empty thought signature, if any.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.thought_signature.as_deref().filter(|s| !s.is_empty())
    }

    /// A text part is reasoning when it carries a signature or `thought: true`.
    #[must_use]
    pub fn is_reasoning(&self) -> bool {
        self.signature().is_some() || self.thought == Some(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

/// Gemini generateContent response wire type (one SSE event when streaming).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

/// A candidate in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl GeminiCandidate {
    #[must_use]
    pub fn parts(&self) -> &[GeminiPart] {
        self.content.as_ref().map_or(&[], |content| &content.parts)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Usage metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u64>,
}

impl GeminiUsageMetadata {
    /// Counters copied verbatim; thoughts are reported beside completion tokens.
    #[must_use]
    pub fn to_usage(&self) -> Usage {
        Usage::from_counts(
            self.prompt_token_count.unwrap_or(0),
            self.candidates_token_count.unwrap_or(0),
            self.total_token_count,
            self.thoughts_token_count,
        )
    }
}

/// A tool declaration (contains function declarations).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolDeclaration {
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

/// A function declaration within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Tool configuration (function calling mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<GeminiFunctionCallingConfig>,
}

/// Function calling config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFunctionCallingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Generation config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiThinkingConfig {
    pub include_thoughts: bool,
    pub thinking_budget: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Top-level payload shapes: Code-Assist style `{"response": ...}`, an error
/// object, or a bare response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiEnvelope {
    Wrapped { response: GeminiResponse },
    Error { error: GeminiErrorBody },
    Plain(GeminiResponse),
}

/// Parse one Gemini JSON payload, unwrapping the `response` envelope.
///
/// # Errors
///
/// Returns [`AdapterError::UpstreamProtocol`] for non-JSON payloads and for
/// embedded `error` objects.
pub fn parse_gemini_payload(data: &[u8]) -> Result<GeminiResponse, AdapterError> {
    let envelope: GeminiEnvelope = serde_json::from_slice(data)
        .map_err(|e| AdapterError::protocol(format!("invalid Gemini payload: {e}")))?;
    match envelope {
        GeminiEnvelope::Wrapped { response } | GeminiEnvelope::Plain(response) => Ok(response),
        GeminiEnvelope::Error { error } => Err(AdapterError::UpstreamProtocol {
            status: error.code.unwrap_or(PROTOCOL_FAULT_STATUS),
            message: match error.status {
                Some(status) => format!("{status}: {}", error.message),
                None => error.message,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unwraps_response_envelope() {
        let event = parse_gemini_payload(
            br#"{"response":{"candidates":[{"content":{"role":"model","parts":[{"text":"hi"}]}}]}}"#,
        )
        .unwrap();
        assert_eq!(event.candidates[0].parts()[0].text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_parse_plain_response_with_signature() {
        let event = parse_gemini_payload(
            br#"{"candidates":[{"content":{"parts":[{"text":"t","thoughtSignature":"abc"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"thoughtsTokenCount":2}}"#,
        )
        .unwrap();
        let part = &event.candidates[0].parts()[0];
        assert!(part.is_reasoning());
        assert_eq!(part.signature(), Some("abc"));
        let usage = event.usage_metadata.unwrap().to_usage();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.thoughts_tokens, Some(2));
        assert_eq!(usage.total_tokens, 5);
    }

    #[test]
    fn test_parse_error_object() {
        let err = parse_gemini_payload(
            br#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::UpstreamProtocol { status: 429, ref message } if message.contains("quota")
        ));
    }

    #[test]
    fn test_parse_non_json_is_protocol_error() {
        let err = parse_gemini_payload(b"not json").unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamProtocol { status: 502, .. }));
    }

    #[test]
    fn test_empty_signature_is_not_reasoning() {
        let part: GeminiPart =
            serde_json::from_str(r#"{"text":"x","thoughtSignature":""}"#).unwrap();
        assert!(!part.is_reasoning());
    }
}
