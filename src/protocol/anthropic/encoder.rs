use serde_json::json;
use tracing::debug;

use crate::error::AdapterError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicThinking, AnthropicTool, DEFAULT_MAX_TOKENS, MAX_THINKING_BUDGET,
};
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, ImageSource, MessageContent,
    ToolChoice,
};
use crate::protocol::mapping::canonical_role_to_anthropic;
use crate::protocol::thinking::ThinkingSettings;
use crate::util::parse_tool_arguments;

/// Encode a canonical request into an Anthropic Messages request.
///
/// System messages are lifted to the top-level `system` field and consecutive
/// turns with the same Anthropic role are merged, since the API requires
/// alternating roles.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidRequest`] when no message is left after the
/// system prompt is lifted.
pub fn encode_anthropic_request(
    canonical: &CanonicalRequest,
    thinking: ThinkingSettings,
) -> Result<AnthropicRequest, AdapterError> {
    let system_texts: Vec<String> = canonical
        .messages
        .iter()
        .filter(|msg| msg.role == CanonicalRole::System)
        .map(|msg| msg.text_content().into_owned())
        .filter(|text| !text.is_empty())
        .collect();
    let system = (!system_texts.is_empty()).then(|| system_texts.join("\n\n"));

    let mut messages: Vec<AnthropicMessage> = Vec::with_capacity(canonical.messages.len());
    for msg in &canonical.messages {
        if msg.role == CanonicalRole::System {
            continue;
        }
        let blocks = encode_blocks(msg);
        if blocks.is_empty() {
            continue;
        }
        let role = canonical_role_to_anthropic(msg.role);
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(AnthropicMessage {
                role: role.to_string(),
                content: blocks,
            }),
        }
    }
    if messages.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "request has no user or assistant turns".to_string(),
        ));
    }

    let tools = (!canonical.tools().is_empty()).then(|| {
        canonical
            .tools()
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            })
            .collect()
    });

    let mut max_tokens = canonical.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let mut temperature = canonical.temperature;
    let mut top_p = canonical.top_p;
    let thinking_field = if thinking.enabled {
        let budget_tokens = thinking.budget_tokens.min(MAX_THINKING_BUDGET);
        // The API rejects budget_tokens >= max_tokens.
        if budget_tokens >= max_tokens {
            max_tokens = budget_tokens.saturating_add(DEFAULT_MAX_TOKENS);
            debug!("raised Anthropic max_tokens to {} for thinking budget", max_tokens);
        }
        if temperature.is_some() || top_p.is_some() {
            debug!("dropping temperature/top_p: not accepted together with thinking");
            temperature = None;
            top_p = None;
        }
        Some(AnthropicThinking {
            kind: "enabled".to_string(),
            budget_tokens,
        })
    } else {
        None
    };

    Ok(AnthropicRequest {
        model: canonical.model.clone(),
        max_tokens,
        system,
        messages,
        tools,
        tool_choice: canonical.tool_choice.as_ref().map(encode_tool_choice),
        stream: canonical.stream.then_some(true),
        temperature,
        top_p,
        stop_sequences: canonical.stop.as_ref().map(|stop| stop.to_vec()),
        thinking: thinking_field,
    })
}

fn encode_blocks(msg: &CanonicalMessage) -> Vec<AnthropicContentBlock> {
    if msg.role == CanonicalRole::Tool {
        return vec![AnthropicContentBlock::ToolResult {
            tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
            content: msg.text_content().into_owned(),
        }];
    }

    let mut blocks = Vec::new();
    match &msg.content {
        None => {}
        Some(MessageContent::Text(text)) => {
            if !text.is_empty() {
                blocks.push(AnthropicContentBlock::Text { text: text.clone() });
            }
        }
        Some(MessageContent::Blocks(content)) => {
            for block in content {
                match block {
                    ContentBlock::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(AnthropicContentBlock::Text { text: text.clone() });
                        }
                    }
                    ContentBlock::ImageUrl { image_url } => {
                        let source = match image_url.source() {
                            ImageSource::Inline { mime_type, data } => AnthropicImageSource::Base64 {
                                media_type: mime_type.to_string(),
                                data: data.to_string(),
                            },
                            ImageSource::Remote(url) => AnthropicImageSource::Url {
                                url: url.to_string(),
                            },
                        };
                        blocks.push(AnthropicContentBlock::Image { source });
                    }
                }
            }
        }
    }
    for call in msg.tool_calls() {
        blocks.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_tool_arguments(&call.function.arguments),
        });
    }
    blocks
}

fn encode_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => json!({"type": "none"}),
            "required" => json!({"type": "any"}),
            _ => json!({"type": "auto"}),
        },
        ToolChoice::Named { function } => json!({"type": "tool", "name": function.name}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{NamedFunction, ToolCall};

    fn encode(request: &CanonicalRequest, thinking: ThinkingSettings) -> serde_json::Value {
        serde_json::to_value(encode_anthropic_request(request, thinking).unwrap()).unwrap()
    }

    #[test]
    fn test_system_lifted_and_defaults() {
        let request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![
                CanonicalMessage::text(CanonicalRole::System, "rules"),
                CanonicalMessage::text(CanonicalRole::User, "hi"),
            ],
        );
        let wire = encode(&request, ThinkingSettings::DISABLED);
        assert_eq!(wire["system"], "rules");
        assert_eq!(wire["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(wire["messages"][0]["role"], "user");
        assert_eq!(wire["messages"][0]["content"][0], json!({"type": "text", "text": "hi"}));
        assert!(wire.get("stream").is_none());
        assert!(wire.get("thinking").is_none());
    }

    #[test]
    fn test_thinking_raises_max_tokens() {
        let mut request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![CanonicalMessage::text(CanonicalRole::User, "hi")],
        );
        request.max_tokens = Some(1000);
        request.temperature = Some(0.2);
        let wire = encode(
            &request,
            ThinkingSettings {
                enabled: true,
                budget_tokens: 8000,
            },
        );
        assert_eq!(wire["thinking"], json!({"type": "enabled", "budget_tokens": 8000}));
        assert_eq!(wire["max_tokens"], 8000 + DEFAULT_MAX_TOKENS);
        assert!(wire.get("temperature").is_none());
    }

    #[test]
    fn test_thinking_huge_budget_is_clamped() {
        let request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![CanonicalMessage::text(CanonicalRole::User, "hi")],
        );
        let settings = crate::protocol::thinking::normalize(Some(
            &serde_json::from_value(json!({"budget_tokens": 1e30})).unwrap(),
        ));
        assert_eq!(settings.budget_tokens, u64::MAX);

        let wire = encode(&request, settings);
        assert_eq!(wire["thinking"]["budget_tokens"], MAX_THINKING_BUDGET);
        assert_eq!(wire["max_tokens"], u64::from(u32::MAX));
    }

    #[test]
    fn test_tool_round_trip_merges_user_turns() {
        let mut assistant = CanonicalMessage::text(CanonicalRole::Assistant, "checking");
        assistant.tool_calls = Some(vec![
            ToolCall::function("toolu_1", "a", "{}"),
            ToolCall::function("toolu_2", "b", "{\"x\":1}"),
        ]);
        let mut first = CanonicalMessage::text(CanonicalRole::Tool, "r1");
        first.tool_call_id = Some("toolu_1".into());
        let mut second = CanonicalMessage::text(CanonicalRole::Tool, "r2");
        second.tool_call_id = Some("toolu_2".into());
        let mut request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![
                CanonicalMessage::text(CanonicalRole::User, "go"),
                assistant,
                first,
                second,
            ],
        );
        request.tool_choice = Some(ToolChoice::Named {
            function: NamedFunction { name: "a".into() },
        });
        let wire = encode(&request, ThinkingSettings::DISABLED);
        let messages = wire["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][2]["input"], json!({"x": 1}));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "toolu_2");
        assert_eq!(wire["tool_choice"], json!({"type": "tool", "name": "a"}));
    }

    #[test]
    fn test_inline_image_block() {
        let request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![CanonicalMessage::blocks(
                CanonicalRole::User,
                vec![ContentBlock::image("data:image/jpeg;base64,/9j/")],
            )],
        );
        let wire = encode(&request, ThinkingSettings::DISABLED);
        assert_eq!(
            wire["messages"][0]["content"][0]["source"],
            json!({"type": "base64", "media_type": "image/jpeg", "data": "/9j/"})
        );
    }
}
