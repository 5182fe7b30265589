//! Kiro `generateAssistantResponse`: a conversation-state JSON request answered
//! with an AWS event-stream body.

pub mod encoder;
pub mod eventstream;
pub mod response_decoder;
pub mod stream;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use eventstream::EventFrame;

pub const KIRO_ORIGIN: &str = "AI_EDITOR";
pub const KIRO_CHAT_TRIGGER: &str = "MANUAL";
pub const KIRO_AGENT_TASK_TYPE: &str = "vibe";
/// Placeholder Kiro requires for a turn with no text.
pub const KIRO_EMPTY_TURN: &str = "(empty)";
pub const KIRO_CONTINUE: &str = "Continue";

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroPayload {
    pub conversation_state: KiroConversationState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroConversationState {
    pub chat_trigger_type: String,
    pub conversation_id: String,
    pub current_message: KiroCurrentMessage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<KiroHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroCurrentMessage {
    pub user_input_message: KiroUserInputMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KiroHistoryEntry {
    UserInputMessage(KiroUserInputMessage),
    AssistantResponseMessage(KiroAssistantResponseMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroUserInputMessage {
    pub content: String,
    pub model_id: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<KiroImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input_message_context: Option<KiroUserInputMessageContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroUserInputMessageContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<KiroTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<KiroToolResult>,
}

impl KiroUserInputMessageContext {
    fn into_option(self) -> Option<Self> {
        (!self.tools.is_empty() || !self.tool_results.is_empty()).then_some(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiroImage {
    /// Image subtype such as `png` or `jpeg`.
    pub format: String,
    pub source: KiroImageSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiroImageSource {
    /// Base64 payload.
    pub bytes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroTool {
    pub tool_specification: KiroToolSpecification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroToolSpecification {
    pub name: String,
    pub description: String,
    pub input_schema: KiroInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiroInputSchema {
    pub json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroToolResult {
    pub tool_use_id: String,
    pub content: Vec<KiroTextContent>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiroTextContent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroAssistantResponseMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_uses: Vec<KiroToolUse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroToolUse {
    pub tool_use_id: String,
    pub name: String,
    pub input: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiroAssistantResponseEvent {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiroReasoningContentEvent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroToolUseEvent {
    #[serde(default)]
    pub name: String,
    pub tool_use_id: String,
    /// Partial JSON text of the tool input.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub stop: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiroTokenUsage {
    #[serde(default, alias = "input_tokens")]
    pub input_tokens: u64,
    #[serde(default, alias = "output_tokens")]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KiroUsageEnvelope {
    usage: KiroTokenUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KiroExceptionBody {
    #[serde(default, alias = "Message")]
    message: String,
}

/// One decoded Kiro event.
#[derive(Debug, Clone)]
pub enum KiroEvent {
    AssistantResponse(KiroAssistantResponseEvent),
    Reasoning(KiroReasoningContentEvent),
    ToolUse(KiroToolUseEvent),
    Usage(KiroTokenUsage),
    /// Metering, context usage, followup prompts and other informational events.
    Ignored,
}

impl KiroEvent {
    /// Classify one frame, by `:event-type` when present and by payload shape otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] for exception frames and for
    /// payloads that are not JSON.
    pub fn from_frame(frame: &EventFrame) -> Result<Self, AdapterError> {
        if matches!(frame.header(":message-type"), Some("exception" | "error")) {
            return Err(exception_error(frame));
        }
        if frame.payload.is_empty() {
            return Ok(Self::Ignored);
        }
        let value: serde_json::Value = serde_json::from_slice(&frame.payload)
            .map_err(|e| AdapterError::protocol(format!("invalid Kiro event payload: {e}")))?;

        match frame.header(":event-type") {
            Some("assistantResponseEvent") => parse_event(value).map(Self::AssistantResponse),
            Some("reasoningContentEvent") => parse_event(value).map(Self::Reasoning),
            Some("toolUseEvent") => parse_event(value).map(Self::ToolUse),
            Some("meteringEvent" | "contextUsageEvent" | "followupPromptEvent") => Ok(Self::Ignored),
            _ => Ok(classify_payload(value)),
        }
    }
}

fn parse_event<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, AdapterError> {
    serde_json::from_value(value)
        .map_err(|e| AdapterError::protocol(format!("unexpected Kiro event shape: {e}")))
}

/// Shape-based classification for frames without a recognised event type.
fn classify_payload(value: serde_json::Value) -> KiroEvent {
    if let Some(usage) = value.get("usage").filter(|usage| usage.is_object()) {
        if let Ok(usage) = serde_json::from_value::<KiroTokenUsage>(usage.clone()) {
            return KiroEvent::Usage(usage);
        }
    }
    if value.get("toolUseId").is_some() {
        if let Ok(event) = serde_json::from_value::<KiroToolUseEvent>(value.clone()) {
            return KiroEvent::ToolUse(event);
        }
    }
    if let Some(text) = value.get("content").and_then(serde_json::Value::as_str) {
        return KiroEvent::AssistantResponse(KiroAssistantResponseEvent {
            content: text.to_owned(),
        });
    }
    if let Ok(envelope) = serde_json::from_value::<KiroUsageEnvelope>(value) {
        return KiroEvent::Usage(envelope.usage);
    }
    KiroEvent::Ignored
}

fn exception_error(frame: &EventFrame) -> AdapterError {
    let kind = frame
        .header(":exception-type")
        .or_else(|| frame.header(":error-code"))
        .unwrap_or("UnknownException");
    let body: KiroExceptionBody = serde_json::from_slice(&frame.payload).unwrap_or_default();
    let message = if body.message.is_empty() {
        String::from_utf8_lossy(&frame.payload).into_owned()
    } else {
        body.message
    };
    AdapterError::UpstreamProtocol {
        status: exception_status(kind),
        message: format!("{kind}: {message}"),
    }
}

fn exception_status(kind: &str) -> u16 {
    match kind {
        "ValidationException" => 400,
        "AccessDeniedException" | "UnauthorizedException" => 403,
        "ThrottlingException" | "ServiceQuotaExceededException" => 429,
        "ServiceUnavailableException" => 503,
        _ => crate::error::PROTOCOL_FAULT_STATUS,
    }
}
