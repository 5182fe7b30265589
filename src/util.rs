use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Random UUID with the version-4 layout, drawn from the caller's generator.
#[must_use]
pub fn random_uuid(rng: &mut fastrand::Rng) -> uuid::Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// `chatcmpl-<32 hex>` identifier for one canonical response.
#[must_use]
pub fn response_id(rng: &mut fastrand::Rng) -> String {
    format!("chatcmpl-{}", random_uuid(rng).simple())
}

/// Tool-call id derived from the owning response id, stable per index.
pub(crate) fn tool_call_id(response_id: &str, index: usize) -> String {
    let suffix = response_id
        .strip_prefix("chatcmpl-")
        .unwrap_or(response_id);
    let suffix = suffix.get(..24).unwrap_or(suffix);
    format!("call_{suffix}_{index}")
}

/// Payload of one SSE `data:` field, or `None` for comments, other fields and `[DONE]`.
#[inline]
pub(crate) fn extract_sse_data_payload(data: &str) -> Option<&str> {
    let payload = data.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

/// Parse tool-call arguments, keeping non-JSON text as a string value.
pub(crate) fn parse_tool_arguments(arguments: &str) -> serde_json::Value {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| {
        tracing::warn!("tool call arguments are not valid JSON; forwarding as a string");
        serde_json::Value::String(arguments.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_uuid_is_v4_layout() {
        let mut rng = fastrand::Rng::with_seed(7);
        let id = random_uuid(&mut rng);
        assert_eq!(id.get_version_num(), 4);
        assert_eq!(id.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_seeded_generator_is_deterministic() {
        let a = random_uuid(&mut fastrand::Rng::with_seed(42));
        let b = random_uuid(&mut fastrand::Rng::with_seed(42));
        assert_eq!(a, b);
        let mut rng = fastrand::Rng::with_seed(42);
        assert_ne!(random_uuid(&mut rng), random_uuid(&mut rng));
    }

    #[test]
    fn test_response_id_shape() {
        let id = response_id(&mut fastrand::Rng::with_seed(1));
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), 9 + 32);
    }

    #[test]
    fn test_tool_call_id_is_indexed() {
        let id = tool_call_id("chatcmpl-0123456789abcdef0123456789abcdef", 2);
        assert_eq!(id, "call_0123456789abcdef01234567_2");
    }

    #[test]
    fn test_extract_sse_data_payload() {
        assert_eq!(extract_sse_data_payload(" {\"a\":1} "), Some("{\"a\":1}"));
        assert_eq!(extract_sse_data_payload("[DONE]"), None);
        assert_eq!(extract_sse_data_payload("   "), None);
    }

    #[test]
    fn test_parse_tool_arguments() {
        assert_eq!(parse_tool_arguments(""), serde_json::json!({}));
        assert_eq!(
            parse_tool_arguments("{\"city\":\"Paris\"}"),
            serde_json::json!({"city": "Paris"})
        );
        assert_eq!(
            parse_tool_arguments("not json"),
            serde_json::json!("not json")
        );
    }
}
