//! Request sanitizers: pure `CanonicalRequest -> CanonicalRequest` passes that make a
//! request acceptable to a particular upstream.

use tracing::debug;

use super::canonical::{CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, MessageContent};
use crate::error::AdapterError;

/// One sanitizing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    StripImages,
    PruneEmptyTurns,
    MergeAdjacentTurns,
}

impl Sanitizer {
    #[must_use]
    pub fn apply(self, request: CanonicalRequest) -> CanonicalRequest {
        match self {
            Sanitizer::StripImages => sanitize_for_text_only(request),
            Sanitizer::PruneEmptyTurns => prune_empty_turns(request),
            Sanitizer::MergeAdjacentTurns => merge_adjacent_turns(request),
        }
    }
}

/// Run `plan` in order and reject a request left without messages.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidRequest`] when no message survives.
pub fn run_plan(
    mut request: CanonicalRequest,
    plan: &[Sanitizer],
) -> Result<CanonicalRequest, AdapterError> {
    for sanitizer in plan {
        request = sanitizer.apply(request);
    }
    if request.messages.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "request has no messages after sanitization".to_string(),
        ));
    }
    Ok(request)
}

/// Drop image blocks for text-only upstreams.
///
/// Surviving text blocks are joined with `\n` into plain string content; a message
/// with no text block left is removed. String content is untouched and the
/// relative order of surviving messages is preserved.
#[must_use]
pub fn sanitize_for_text_only(mut request: CanonicalRequest) -> CanonicalRequest {
    let before = request.messages.len();
    request.messages.retain_mut(strip_images);
    let dropped = before - request.messages.len();
    if dropped > 0 {
        debug!("text-only sanitizer dropped {} image-only message(s)", dropped);
    }
    request
}

fn strip_images(message: &mut CanonicalMessage) -> bool {
    let Some(MessageContent::Blocks(blocks)) = &message.content else {
        return true;
    };
    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::ImageUrl { .. } => None,
        })
        .collect();
    let joined = (!texts.is_empty()).then(|| texts.join("\n"));

    let Some(joined) = joined else {
        // Tool calls still need their carrying message.
        if message.tool_calls().is_empty() {
            return false;
        }
        message.content = None;
        return true;
    };
    message.content = Some(MessageContent::Text(joined));
    true
}

/// Drop turns that carry nothing: blank content and no tool calls. Tool results
/// are always kept.
#[must_use]
pub fn prune_empty_turns(mut request: CanonicalRequest) -> CanonicalRequest {
    request.messages.retain(|message| {
        message.role == CanonicalRole::Tool
            || !message.tool_calls().is_empty()
            || message
                .content
                .as_ref()
                .is_some_and(|content| !content.is_blank())
    });
    request
}

/// Merge consecutive plain-text turns of the same role with a blank line between them.
#[must_use]
pub fn merge_adjacent_turns(mut request: CanonicalRequest) -> CanonicalRequest {
    let mut merged: Vec<CanonicalMessage> = Vec::with_capacity(request.messages.len());
    for message in request.messages.drain(..) {
        if let Some(last) = merged.last_mut() {
            if can_merge(last, &message) {
                if let (
                    Some(MessageContent::Text(into)),
                    Some(MessageContent::Text(from)),
                ) = (&mut last.content, &message.content)
                {
                    into.push_str("\n\n");
                    into.push_str(from);
                    continue;
                }
            }
        }
        merged.push(message);
    }
    request.messages = merged;
    request
}

fn can_merge(previous: &CanonicalMessage, next: &CanonicalMessage) -> bool {
    fn plain(message: &CanonicalMessage) -> bool {
        message.role != CanonicalRole::Tool
            && message.tool_calls().is_empty()
            && message.tool_call_id.is_none()
            && matches!(message.content, Some(MessageContent::Text(_)))
    }
    previous.role == next.role && plain(previous) && plain(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::ToolCall;

    fn request(messages: Vec<CanonicalMessage>) -> CanonicalRequest {
        CanonicalRequest::new("m", messages)
    }

    #[test]
    fn test_text_only_joins_surviving_text() {
        let out = sanitize_for_text_only(request(vec![CanonicalMessage::blocks(
            CanonicalRole::User,
            vec![
                ContentBlock::text("hello"),
                ContentBlock::image("data:image/png;base64,AAAA"),
                ContentBlock::text("world"),
            ],
        )]));
        assert_eq!(out.messages.len(), 1);
        assert_eq!(
            out.messages[0].content,
            Some(MessageContent::Text("hello\nworld".to_string()))
        );
    }

    #[test]
    fn test_text_only_removes_image_only_message() {
        let out = sanitize_for_text_only(request(vec![
            CanonicalMessage::text(CanonicalRole::User, "first"),
            CanonicalMessage::blocks(
                CanonicalRole::User,
                vec![ContentBlock::image("https://example.com/a.png")],
            ),
        ]));
        assert_eq!(out.messages.len(), 1);
        assert_eq!(out.messages[0].text_content(), "first");
    }

    #[test]
    fn test_text_only_leaves_string_content() {
        let original = request(vec![
            CanonicalMessage::text(CanonicalRole::System, "sys"),
            CanonicalMessage::text(CanonicalRole::User, "hi"),
        ]);
        assert_eq!(sanitize_for_text_only(original.clone()), original);
    }

    #[test]
    fn test_text_only_keeps_tool_call_carrier() {
        let mut message = CanonicalMessage::blocks(
            CanonicalRole::Assistant,
            vec![ContentBlock::image("https://example.com/a.png")],
        );
        message.tool_calls = Some(vec![ToolCall::function("call_1", "f", "{}")]);
        let out = sanitize_for_text_only(request(vec![message]));
        assert_eq!(out.messages.len(), 1);
        assert!(out.messages[0].content.is_none());
    }

    #[test]
    fn test_run_plan_rejects_empty_result() {
        let result = run_plan(
            request(vec![CanonicalMessage::blocks(
                CanonicalRole::User,
                vec![ContentBlock::image("https://example.com/a.png")],
            )]),
            &[Sanitizer::StripImages],
        );
        assert!(matches!(result, Err(AdapterError::InvalidRequest(_))));
    }

    #[test]
    fn test_prune_empty_turns() {
        let mut tool = CanonicalMessage::text(CanonicalRole::Tool, "");
        tool.tool_call_id = Some("call_1".into());
        let mut assistant_call = CanonicalMessage::text(CanonicalRole::Assistant, "");
        assistant_call.tool_calls = Some(vec![ToolCall::function("call_1", "f", "{}")]);
        let out = prune_empty_turns(request(vec![
            CanonicalMessage::text(CanonicalRole::User, "hi"),
            CanonicalMessage::text(CanonicalRole::Assistant, "  "),
            assistant_call,
            tool,
            CanonicalMessage::blocks(CanonicalRole::User, vec![]),
        ]));
        let roles: Vec<_> = out.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                CanonicalRole::User,
                CanonicalRole::Assistant,
                CanonicalRole::Tool
            ]
        );
    }

    #[test]
    fn test_merge_adjacent_turns() {
        let out = merge_adjacent_turns(request(vec![
            CanonicalMessage::text(CanonicalRole::User, "a"),
            CanonicalMessage::text(CanonicalRole::User, "b"),
            CanonicalMessage::text(CanonicalRole::Assistant, "c"),
            CanonicalMessage::blocks(CanonicalRole::Assistant, vec![ContentBlock::text("d")]),
        ]));
        assert_eq!(out.messages.len(), 3);
        assert_eq!(out.messages[0].text_content(), "a\n\nb");
        assert_eq!(out.messages[1].text_content(), "c");
    }
}
