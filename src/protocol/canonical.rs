use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use super::thinking::ThinkingConfig;

/// Upstream protocol family behind a configured service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    Kiro,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Kiro => "kiro",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalRole {
    #[serde(alias = "developer")]
    System,
    User,
    Assistant,
    Tool,
}

impl CanonicalRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalRole::System => "system",
            CanonicalRole::User => "user",
            CanonicalRole::Assistant => "assistant",
            CanonicalRole::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Where the bytes of an image block live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// `data:<mime>;base64,<payload>`
    Inline { mime_type: &'a str, data: &'a str },
    Remote(&'a str),
}

impl ImageUrl {
    #[must_use]
    pub fn source(&self) -> ImageSource<'_> {
        parse_data_url(&self.url).unwrap_or(ImageSource::Remote(&self.url))
    }
}

fn parse_data_url(url: &str) -> Option<ImageSource<'_>> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let mime_type = if mime_type.is_empty() {
        "image/png"
    } else {
        mime_type
    };
    Some(ImageSource::Inline { mime_type, data })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        ContentBlock::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

/// Message body: a plain string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// True when there is no image and no non-blank text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Blocks(blocks) => blocks.iter().all(|block| match block {
                ContentBlock::Text { text } => text.trim().is_empty(),
                ContentBlock::ImageUrl { .. } => false,
            }),
        }
    }

    /// Text of the message with blocks joined by `\n`; images are skipped.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Blocks(blocks) => {
                let mut texts = blocks.iter().filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ImageUrl { .. } => None,
                });
                match (texts.next(), texts.next()) {
                    (None, _) => Cow::Borrowed(""),
                    (Some(only), None) => Cow::Borrowed(only),
                    (Some(first), Some(second)) => {
                        let mut joined = String::with_capacity(first.len() + second.len() + 1);
                        joined.push_str(first);
                        joined.push('\n');
                        joined.push_str(second);
                        for text in texts {
                            joined.push('\n');
                            joined.push_str(text);
                        }
                        Cow::Owned(joined)
                    }
                }
            }
        }
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageUrl> {
        let blocks: &[ContentBlock] = match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        };
        blocks.iter().filter_map(|block| match block {
            ContentBlock::ImageUrl { image_url } => Some(image_url),
            ContentBlock::Text { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    #[must_use]
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: CanonicalRole,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl CanonicalMessage {
    #[must_use]
    pub fn text(role: CanonicalRole, text: impl Into<String>) -> Self {
        Self::with_content(role, MessageContent::Text(text.into()))
    }

    #[must_use]
    pub fn blocks(role: CanonicalRole, blocks: Vec<ContentBlock>) -> Self {
        Self::with_content(role, MessageContent::Blocks(blocks))
    }

    fn with_content(role: CanonicalRole, content: MessageContent) -> Self {
        Self {
            role,
            content: Some(content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Text content, empty when absent.
    #[must_use]
    pub fn text_content(&self) -> Cow<'_, str> {
        self.content
            .as_ref()
            .map_or(Cow::Borrowed(""), MessageContent::text)
    }

    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFunction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"auto"`, `"none"` or `"required"`.
    Mode(String),
    Named { function: NamedFunction },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    Single(String),
    Many(Vec<String>),
}

impl StopSequences {
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StopSequences::Single(stop) => vec![stop.clone()],
            StopSequences::Many(stops) => stops.clone(),
        }
    }
}

/// Inbound chat-completion request in the canonical shape. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(
        default,
        alias = "max_completion_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
}

impl CanonicalRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<CanonicalMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            thinking: None,
            stream: false,
            tools: None,
            tool_choice: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
        }
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolSpec] {
        self.tools.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Response side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub thoughts_tokens: Option<u64>,
}

impl Usage {
    /// Build usage from provider counters. A reported total wins; otherwise the
    /// total is prompt + completion + thoughts.
    #[must_use]
    pub fn from_counts(
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: Option<u64>,
        thoughts_tokens: Option<u64>,
    ) -> Self {
        let total_tokens = total_tokens.unwrap_or_else(|| {
            prompt_tokens
                .saturating_add(completion_tokens)
                .saturating_add(thoughts_tokens.unwrap_or(0))
        });
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            thoughts_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub function: ToolCallFunctionDelta,
}

impl ToolCallDelta {
    /// First delta of a call: carries id, type and name.
    #[must_use]
    pub fn open(index: usize, id: String, name: String, arguments: Option<String>) -> Self {
        Self {
            index,
            id: Some(id),
            kind: Some(function_type()),
            function: ToolCallFunctionDelta {
                name: Some(name),
                arguments: Some(arguments.unwrap_or_default()),
            },
        }
    }

    #[must_use]
    pub fn arguments(index: usize, fragment: String) -> Self {
        Self {
            index,
            id: None,
            kind: None,
            function: ToolCallFunctionDelta {
                name: None,
                arguments: Some(fragment),
            },
        }
    }
}

/// One incremental piece of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalChunk {
    pub role: Option<CanonicalRole>,
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    /// Last thought signature seen; set on the terminal chunk only.
    pub reasoning_signature: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub reasoning_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalResponse {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub message: ResponseMessage,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

/// Identity and accounting context of one response, fixed before the upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub id: String,
    /// Model name echoed to the client.
    pub model: String,
    pub created: u64,
    /// Local estimate, used only when the upstream reports no prompt tokens.
    pub prompt_tokens_estimate: u64,
}

impl ResponseMeta {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
            prompt_tokens_estimate: 0,
        }
    }

    #[must_use]
    pub fn with_prompt_estimate(mut self, prompt_tokens_estimate: u64) -> Self {
        self.prompt_tokens_estimate = prompt_tokens_estimate;
        self
    }
}

// ---------------------------------------------------------------------------
// Per-stream state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Start,
    Streaming,
    Done,
}

/// Mutable state owned by exactly one stream decoder.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub prompt_tokens_estimate: u64,
    pub role_emitted: bool,
    /// Number of tool calls opened so far; the next call gets this index.
    pub open_tool_call_index: usize,
    pub last_reasoning_signature: Option<String>,
    pub phase: StreamPhase,
}

impl StreamState {
    #[must_use]
    pub fn new(meta: &ResponseMeta) -> Self {
        Self {
            id: meta.id.clone(),
            model: meta.model.clone(),
            created: meta.created,
            prompt_tokens_estimate: meta.prompt_tokens_estimate,
            role_emitted: false,
            open_tool_call_index: 0,
            last_reasoning_signature: None,
            phase: StreamPhase::Start,
        }
    }

    #[must_use]
    pub fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created,
            prompt_tokens_estimate: self.prompt_tokens_estimate,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == StreamPhase::Done
    }

    /// Empty chunk that carries the assistant role if no chunk has yet.
    pub fn chunk(&mut self) -> CanonicalChunk {
        let mut chunk = CanonicalChunk::default();
        if !self.role_emitted {
            chunk.role = Some(CanonicalRole::Assistant);
            self.role_emitted = true;
        }
        if self.phase == StreamPhase::Start {
            self.phase = StreamPhase::Streaming;
        }
        chunk
    }

    pub fn content_chunk(&mut self, text: impl Into<String>) -> CanonicalChunk {
        let mut chunk = self.chunk();
        chunk.content = Some(text.into());
        chunk
    }

    pub fn reasoning_chunk(&mut self, text: impl Into<String>) -> CanonicalChunk {
        let mut chunk = self.chunk();
        chunk.reasoning_content = Some(text.into());
        chunk
    }

    pub fn tool_call_chunk(&mut self, delta: ToolCallDelta) -> CanonicalChunk {
        let mut chunk = self.chunk();
        chunk.tool_calls = Some(vec![delta]);
        chunk
    }

    /// Reserve the index for a newly opened tool call.
    pub fn open_tool_call(&mut self) -> usize {
        let index = self.open_tool_call_index;
        self.open_tool_call_index += 1;
        index
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.open_tool_call_index > 0
    }

    pub fn record_signature(&mut self, signature: &str) {
        if !signature.is_empty() {
            self.last_reasoning_signature = Some(signature.to_owned());
        }
    }

    /// Terminal chunk; moves the stream to `Done`.
    pub fn finish_chunk(&mut self, reason: FinishReason, usage: Option<Usage>) -> CanonicalChunk {
        let mut chunk = self.chunk();
        chunk.finish_reason = Some(reason);
        chunk.usage = usage;
        chunk.reasoning_signature = self.last_reasoning_signature.clone();
        self.phase = StreamPhase::Done;
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_deserializes_openai_shape() {
        let request: CanonicalRequest = serde_json::from_value(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "user", "content": [
                    {"type": "text", "text": "what is this"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                ]},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": "{}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "42"}
            ],
            "max_completion_tokens": 64,
            "stop": "END",
            "unknown_field": true
        }))
        .unwrap();

        assert_eq!(request.messages[0].role, CanonicalRole::System);
        assert!(!request.stream);
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.stop.unwrap().to_vec(), vec!["END".to_string()]);
        assert!(request.messages[2].content.is_none());
        assert_eq!(request.messages[2].tool_calls()[0].function.name, "lookup");
        let images: Vec<_> = request.messages[1]
            .content
            .as_ref()
            .unwrap()
            .images()
            .collect();
        assert_eq!(
            images[0].source(),
            ImageSource::Inline {
                mime_type: "image/jpeg",
                data: "AAAA"
            }
        );
    }

    #[test]
    fn test_remote_image_source() {
        let image = ImageUrl {
            url: "https://example.com/cat.png".into(),
            detail: None,
        };
        assert_eq!(
            image.source(),
            ImageSource::Remote("https://example.com/cat.png")
        );
    }

    #[test]
    fn test_message_text_joins_blocks() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::text("a"),
            ContentBlock::image("https://x/y.png"),
            ContentBlock::text("b"),
        ]);
        assert_eq!(content.text(), "a\nb");
        assert!(!content.is_blank());
        assert!(MessageContent::Blocks(vec![]).is_blank());
        assert!(MessageContent::Text("  ".into()).is_blank());
    }

    #[test]
    fn test_usage_total_falls_back_to_sum() {
        let usage = Usage::from_counts(3, 4, None, Some(2));
        assert_eq!(usage.total_tokens, 9);
        let reported = Usage::from_counts(1, 1, Some(2), Some(1));
        assert_eq!(reported.total_tokens, 2);
        let huge = Usage::from_counts(u64::MAX, 5, None, Some(1));
        assert_eq!(huge.total_tokens, u64::MAX);
    }

    #[test]
    fn test_stream_state_emits_role_once() {
        let mut state = StreamState::new(&ResponseMeta::new("chatcmpl-1", "m", 0));
        assert_eq!(state.phase, StreamPhase::Start);
        let first = state.content_chunk("a");
        let second = state.content_chunk("b");
        assert_eq!(first.role, Some(CanonicalRole::Assistant));
        assert_eq!(second.role, None);
        assert_eq!(state.phase, StreamPhase::Streaming);

        state.record_signature("sig");
        let last = state.finish_chunk(FinishReason::Stop, None);
        assert!(state.is_done());
        assert_eq!(last.reasoning_signature.as_deref(), Some("sig"));
    }
}
