use crate::protocol::canonical::{CanonicalRequest, ContentBlock, MessageContent};

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    tokens_for_len(text.len())
}

/// Same heuristic for a byte count already known to the caller.
#[must_use]
pub fn tokens_for_len(len: usize) -> u64 {
    (len as u64).div_ceil(4)
}

/// Estimate the total input tokens for a canonical request.
///
/// Sums message text, tool-call arguments and serialized tool definitions.
/// Images are not counted.
#[must_use]
pub fn estimate_request_tokens(request: &CanonicalRequest) -> u64 {
    let mut total: u64 = 0;

    for msg in &request.messages {
        match &msg.content {
            Some(MessageContent::Text(text)) => total += estimate_tokens(text),
            Some(MessageContent::Blocks(blocks)) => {
                for block in blocks {
                    if let ContentBlock::Text { text } = block {
                        total += estimate_tokens(text);
                    }
                }
            }
            None => {}
        }
        for call in msg.tool_calls() {
            total += estimate_tokens(&call.function.name);
            total += estimate_tokens(&call.function.arguments);
        }
    }

    for tool in request.tools() {
        if let Some(parameters) = &tool.function.parameters {
            if let Ok(serialized) = serde_json::to_string(parameters) {
                total += estimate_tokens(&serialized);
            }
        }
        if let Some(desc) = &tool.function.description {
            total += estimate_tokens(desc);
        }
        total += estimate_tokens(&tool.function.name);
    }

    total
}
