use http::{HeaderMap, HeaderValue};

use super::{ProviderAdapter, RequestBuilder, ResponseMapper, StreamDecoder, UpstreamRequest};
use crate::error::AdapterError;
use crate::protocol::canonical::{CanonicalRequest, CanonicalResponse, ProviderKind, ResponseMeta, StreamState};
use crate::protocol::kiro::encoder::encode_kiro_request;
use crate::protocol::kiro::response_decoder::decode_kiro_response;
use crate::protocol::kiro::stream::KiroStreamDecoder;
use crate::protocol::sanitize::Sanitizer;

pub const KIRO_GENERATE_PATH: &str = "/generateAssistantResponse";

/// Kiro conversational API. Always answers with an event stream, so the
/// non-streaming path folds the stream into one response.
#[derive(Debug, Clone, Copy, Default)]
pub struct KiroAdapter;

impl RequestBuilder for KiroAdapter {
    fn sanitizers(&self) -> &'static [Sanitizer] {
        &[Sanitizer::PruneEmptyTurns, Sanitizer::MergeAdjacentTurns]
    }

    fn build(
        &self,
        request: &CanonicalRequest,
        rng: &mut fastrand::Rng,
    ) -> Result<UpstreamRequest, AdapterError> {
        let payload = encode_kiro_request(request, rng)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("application/vnd.amazon.eventstream"),
        );
        Ok(UpstreamRequest {
            path: KIRO_GENERATE_PATH.to_string(),
            headers,
            body: serde_json::Value::Object(payload),
        })
    }
}

impl ResponseMapper for KiroAdapter {
    fn map_response(
        &self,
        body: &[u8],
        meta: &ResponseMeta,
    ) -> Result<CanonicalResponse, AdapterError> {
        decode_kiro_response(body, meta)
    }
}

impl ProviderAdapter for KiroAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kiro
    }

    fn stream_decoder(&self, state: StreamState) -> Box<dyn StreamDecoder> {
        Box::new(KiroStreamDecoder::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{CanonicalMessage, CanonicalRole};

    #[test]
    fn test_build_stamps_and_uses_text_hint() {
        let mut request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![CanonicalMessage::text(CanonicalRole::User, "hi")],
        );
        request.thinking = serde_json::from_value(serde_json::json!("enabled")).ok();
        let built = KiroAdapter
            .build(&request, &mut fastrand::Rng::with_seed(11))
            .unwrap();
        assert_eq!(built.path, KIRO_GENERATE_PATH);
        let state = &built.body["conversationState"];
        assert_eq!(state["agentTaskType"], "vibe");
        let content = state["currentMessage"]["userInputMessage"]["content"]
            .as_str()
            .unwrap();
        assert!(content.starts_with("<thinking_mode>enabled</thinking_mode>"));
        assert!(content.ends_with("\n\nhi"));
    }
}
