use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AdapterError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, ImageSource, MessageContent,
};
use crate::protocol::kiro::{
    KiroAssistantResponseMessage, KiroConversationState, KiroCurrentMessage, KiroHistoryEntry,
    KiroImage, KiroImageSource, KiroInputSchema, KiroPayload, KiroTextContent, KiroTool,
    KiroToolResult, KiroToolSpecification, KiroToolUse, KiroUserInputMessage,
    KiroUserInputMessageContext, KIRO_AGENT_TASK_TYPE, KIRO_CHAT_TRIGGER, KIRO_CONTINUE,
    KIRO_EMPTY_TURN, KIRO_ORIGIN,
};
use crate::protocol::thinking::{self, ThinkingSettings};
use crate::util::{parse_tool_arguments, random_uuid};

/// A Kiro request body before conversation-state stamping.
pub type KiroPayloadDraft = Map<String, Value>;

/// Return a copy of `draft` whose `conversationState` carries a fresh
/// `agentContinuationId` and the fixed `agentTaskType`.
///
/// A missing or non-object `conversationState` is replaced by an empty object.
/// Every other key is preserved.
#[must_use]
pub fn stamp_conversation_state(draft: &KiroPayloadDraft, rng: &mut fastrand::Rng) -> KiroPayloadDraft {
    let mut payload = draft.clone();
    let state = payload
        .entry("conversationState")
        .or_insert_with(|| Value::Object(Map::new()));
    if !state.is_object() {
        *state = Value::Object(Map::new());
    }
    if let Value::Object(state) = state {
        state.insert(
            "agentContinuationId".to_string(),
            Value::String(random_uuid(rng).to_string()),
        );
        state.insert(
            "agentTaskType".to_string(),
            Value::String(KIRO_AGENT_TASK_TYPE.to_string()),
        );
    }
    payload
}

/// Build and stamp the Kiro request body.
///
/// Kiro has no native thinking switch, so an enabled thinking config becomes the
/// text hint in the system prompt before the turns are laid out.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidRequest`] when no user or assistant turn remains.
pub fn encode_kiro_request(
    request: &CanonicalRequest,
    rng: &mut fastrand::Rng,
) -> Result<KiroPayloadDraft, AdapterError> {
    let settings = thinking::normalize(request.thinking.as_ref());
    let payload = build_payload(request, settings, random_uuid(rng).to_string())?;
    let draft = match serde_json::to_value(&payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(AdapterError::Internal("Kiro payload is not an object".into())),
        Err(e) => return Err(AdapterError::Internal(format!("failed to serialize Kiro payload: {e}"))),
    };
    Ok(stamp_conversation_state(&draft, rng))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug)]
struct Turn {
    role: TurnRole,
    text: String,
    images: Vec<KiroImage>,
    tool_uses: Vec<KiroToolUse>,
    tool_results: Vec<KiroToolResult>,
}

impl Turn {
    fn user(text: &str) -> Self {
        Self {
            role: TurnRole::User,
            text: text.to_string(),
            images: Vec::new(),
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    fn merge(&mut self, other: Turn) {
        if !other.text.is_empty() {
            if !self.text.is_empty() {
                self.text.push_str("\n\n");
            }
            self.text.push_str(&other.text);
        }
        self.images.extend(other.images);
        self.tool_uses.extend(other.tool_uses);
        self.tool_results.extend(other.tool_results);
    }

    fn display_text(&self) -> String {
        if self.text.is_empty() {
            KIRO_EMPTY_TURN.to_string()
        } else {
            self.text.clone()
        }
    }
}

fn build_payload(
    request: &CanonicalRequest,
    settings: ThinkingSettings,
    conversation_id: String,
) -> Result<KiroPayload, AdapterError> {
    let request = thinking::apply_settings(request.clone(), settings);

    let system_text = request
        .messages
        .iter()
        .filter(|msg| msg.role == CanonicalRole::System)
        .map(|msg| msg.text_content().into_owned())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut turns: Vec<Turn> = Vec::with_capacity(request.messages.len());
    for msg in request.messages.iter().filter(|m| m.role != CanonicalRole::System) {
        let turn = to_turn(msg);
        match turns.last_mut() {
            Some(last) if last.role == turn.role => last.merge(turn),
            _ => turns.push(turn),
        }
    }
    if turns.is_empty() && system_text.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "request has no user or assistant turns".to_string(),
        ));
    }

    if turns.first().map(|turn| turn.role) != Some(TurnRole::User) {
        turns.insert(0, Turn::user(""));
    }
    if !system_text.is_empty() {
        let first = &mut turns[0];
        first.text = if first.text.is_empty() {
            system_text
        } else {
            format!("{system_text}\n\n{}", first.text)
        };
    }
    if turns.last().map(|turn| turn.role) == Some(TurnRole::Assistant) {
        debug!("Kiro conversation ends with an assistant turn, appending a continue turn");
        turns.push(Turn::user(KIRO_CONTINUE));
    }

    let Some(current) = turns.pop() else {
        return Err(AdapterError::Internal("Kiro turn list unexpectedly empty".into()));
    };
    let model_id = request.model.clone();

    let history = turns
        .into_iter()
        .map(|turn| match turn.role {
            TurnRole::User => KiroHistoryEntry::UserInputMessage(KiroUserInputMessage {
                content: turn.display_text(),
                model_id: model_id.clone(),
                origin: KIRO_ORIGIN.to_string(),
                images: turn.images,
                user_input_message_context: KiroUserInputMessageContext {
                    tools: Vec::new(),
                    tool_results: turn.tool_results,
                }
                .into_option(),
            }),
            TurnRole::Assistant => {
                KiroHistoryEntry::AssistantResponseMessage(KiroAssistantResponseMessage {
                    content: turn.display_text(),
                    tool_uses: turn.tool_uses,
                })
            }
        })
        .collect();

    let current_content = if current.text.is_empty() {
        KIRO_CONTINUE.to_string()
    } else {
        current.text
    };
    let context = KiroUserInputMessageContext {
        tools: encode_tools(&request),
        tool_results: current.tool_results,
    };

    Ok(KiroPayload {
        conversation_state: KiroConversationState {
            chat_trigger_type: KIRO_CHAT_TRIGGER.to_string(),
            conversation_id,
            current_message: KiroCurrentMessage {
                user_input_message: KiroUserInputMessage {
                    content: current_content,
                    model_id,
                    origin: KIRO_ORIGIN.to_string(),
                    images: current.images,
                    user_input_message_context: context.into_option(),
                },
            },
            history,
        },
    })
}

fn to_turn(msg: &CanonicalMessage) -> Turn {
    if msg.role == CanonicalRole::Tool {
        let mut turn = Turn::user("");
        turn.tool_results.push(KiroToolResult {
            tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
            content: vec![KiroTextContent {
                text: msg.text_content().into_owned(),
            }],
            status: "success".to_string(),
        });
        return turn;
    }

    let role = if msg.role == CanonicalRole::Assistant {
        TurnRole::Assistant
    } else {
        TurnRole::User
    };
    let mut turn = Turn {
        role,
        text: msg.text_content().into_owned(),
        images: Vec::new(),
        tool_uses: Vec::new(),
        tool_results: Vec::new(),
    };
    if let Some(MessageContent::Blocks(blocks)) = &msg.content {
        for block in blocks {
            let ContentBlock::ImageUrl { image_url } = block else {
                continue;
            };
            match image_url.source() {
                ImageSource::Inline { mime_type, data } => turn.images.push(KiroImage {
                    format: mime_type
                        .rsplit('/')
                        .next()
                        .unwrap_or(mime_type)
                        .to_string(),
                    source: KiroImageSource {
                        bytes: data.to_string(),
                    },
                }),
                ImageSource::Remote(url) => {
                    warn!(url = %url, "dropping remote image: Kiro accepts inline images only");
                }
            }
        }
    }
    for call in msg.tool_calls() {
        turn.tool_uses.push(KiroToolUse {
            tool_use_id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_tool_arguments(&call.function.arguments),
        });
    }
    turn
}

fn encode_tools(request: &CanonicalRequest) -> Vec<KiroTool> {
    request
        .tools()
        .iter()
        .map(|tool| {
            let function = &tool.function;
            KiroTool {
                tool_specification: KiroToolSpecification {
                    name: function.name.clone(),
                    description: function
                        .description
                        .clone()
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| format!("Tool: {}", function.name)),
                    input_schema: KiroInputSchema {
                        json: function
                            .parameters
                            .clone()
                            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
                    },
                },
            }
        })
        .collect()
}
