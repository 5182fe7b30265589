use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::AdapterError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, ImageSource, MessageContent,
    ToolChoice,
};
use crate::protocol::gemini::{
    GeminiBlob, GeminiContent, GeminiFileData, GeminiFunctionCall, GeminiFunctionCallingConfig,
    GeminiFunctionDeclaration, GeminiFunctionResponse, GeminiGenerationConfig, GeminiPart,
    GeminiRequest, GeminiThinkingConfig, GeminiToolConfig, GeminiToolDeclaration,
};
use crate::protocol::mapping::canonical_role_to_gemini;
use crate::protocol::thinking::ThinkingSettings;
use crate::util::parse_tool_arguments;

/// Encode a canonical request into a Gemini wire request for upstream.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidRequest`] when no user or assistant turn is left
/// after system messages are moved into `systemInstruction`.
pub fn encode_gemini_request(
    canonical: &CanonicalRequest,
    thinking: ThinkingSettings,
) -> Result<GeminiRequest, AdapterError> {
    // --- system instruction ---
    let system_parts: Vec<GeminiPart> = canonical
        .messages
        .iter()
        .filter(|msg| msg.role == CanonicalRole::System)
        .map(CanonicalMessage::text_content)
        .filter(|text| !text.is_empty())
        .map(|text| GeminiPart::text(text.into_owned()))
        .collect();
    let system_instruction = (!system_parts.is_empty()).then(|| GeminiContent {
        role: None,
        parts: system_parts,
    });

    // --- contents ---
    let call_id_to_name: FxHashMap<&str, &str> = canonical
        .messages
        .iter()
        .flat_map(CanonicalMessage::tool_calls)
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect();

    let mut contents: Vec<GeminiContent> = Vec::with_capacity(canonical.messages.len());
    for msg in &canonical.messages {
        if msg.role == CanonicalRole::System {
            continue;
        }
        let parts = encode_message_parts(msg, &call_id_to_name);
        if parts.is_empty() {
            continue;
        }
        let role = canonical_role_to_gemini(msg.role);
        // Gemini expects all functionResponse parts of one turn together.
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }
    if contents.is_empty() {
        return Err(AdapterError::InvalidRequest(
            "request has no user or assistant turns".to_string(),
        ));
    }

    // --- tools ---
    let tools = (!canonical.tools().is_empty()).then(|| {
        vec![GeminiToolDeclaration {
            function_declarations: canonical
                .tools()
                .iter()
                .map(|tool| GeminiFunctionDeclaration {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                })
                .collect(),
        }]
    });
    let tool_config = canonical.tool_choice.as_ref().map(encode_tool_choice);

    // --- generation config ---
    let thinking_config = thinking.enabled.then(|| GeminiThinkingConfig {
        include_thoughts: true,
        thinking_budget: thinking.budget_tokens,
    });
    let generation_config = GeminiGenerationConfig {
        temperature: canonical.temperature,
        top_p: canonical.top_p,
        max_output_tokens: canonical.max_tokens,
        stop_sequences: canonical.stop.as_ref().map(|stop| stop.to_vec()),
        thinking_config,
    };
    let has_generation_config = generation_config.temperature.is_some()
        || generation_config.top_p.is_some()
        || generation_config.max_output_tokens.is_some()
        || generation_config.stop_sequences.is_some()
        || generation_config.thinking_config.is_some();

    Ok(GeminiRequest {
        contents,
        tools,
        tool_config,
        system_instruction,
        generation_config: has_generation_config.then_some(generation_config),
    })
}

fn encode_message_parts(
    msg: &CanonicalMessage,
    call_id_to_name: &FxHashMap<&str, &str>,
) -> Vec<GeminiPart> {
    if msg.role == CanonicalRole::Tool {
        let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
        // Prefer call-id binding; fallback to message-level name, then call_id.
        let name = call_id_to_name
            .get(call_id)
            .copied()
            .or(msg.name.as_deref())
            .unwrap_or(call_id);
        let text = msg.text_content();
        let result = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value @ serde_json::Value::Object(_)) => value,
            Ok(value) => serde_json::json!({ "result": value }),
            Err(_) => serde_json::json!({ "result": text }),
        };
        return vec![GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                name: name.to_string(),
                response: result,
            }),
            ..GeminiPart::default()
        }];
    }

    let mut parts = Vec::new();
    match &msg.content {
        None => {}
        Some(MessageContent::Text(text)) => {
            if !text.is_empty() {
                parts.push(GeminiPart::text(text.clone()));
            }
        }
        Some(MessageContent::Blocks(blocks)) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(GeminiPart::text(text.clone())),
                    ContentBlock::ImageUrl { image_url } => parts.push(encode_image(image_url.source())),
                }
            }
        }
    }
    for call in msg.tool_calls() {
        parts.push(GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: None,
                name: call.function.name.clone(),
                args: parse_tool_arguments(&call.function.arguments),
            }),
            ..GeminiPart::default()
        });
    }
    parts
}

fn encode_image(source: ImageSource<'_>) -> GeminiPart {
    match source {
        ImageSource::Inline { mime_type, data } => GeminiPart {
            inline_data: Some(GeminiBlob {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
            ..GeminiPart::default()
        },
        ImageSource::Remote(url) => {
            debug!("forwarding remote image as Gemini fileData");
            GeminiPart {
                file_data: Some(GeminiFileData {
                    mime_type: None,
                    file_uri: url.to_string(),
                }),
                ..GeminiPart::default()
            }
        }
    }
}

fn encode_tool_choice(choice: &ToolChoice) -> GeminiToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => ("NONE", None),
            "required" => ("ANY", None),
            _ => ("AUTO", None),
        },
        ToolChoice::Named { function } => ("ANY", Some(vec![function.name.clone()])),
    };
    GeminiToolConfig {
        function_calling_config: Some(GeminiFunctionCallingConfig {
            mode: Some(mode.to_string()),
            allowed_function_names: allowed,
        }),
    }
}
