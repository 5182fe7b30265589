use http::{HeaderMap, HeaderValue};

use super::{to_json_body, ProviderAdapter, RequestBuilder, ResponseMapper, StreamDecoder, UpstreamRequest};
use crate::error::AdapterError;
use crate::protocol::anthropic::encoder::encode_anthropic_request;
use crate::protocol::anthropic::response_decoder::decode_anthropic_response_body;
use crate::protocol::anthropic::stream::AnthropicStreamDecoder;
use crate::protocol::anthropic::ANTHROPIC_VERSION;
use crate::protocol::canonical::{CanonicalRequest, CanonicalResponse, ProviderKind, ResponseMeta, StreamState};
use crate::protocol::sanitize::Sanitizer;
use crate::protocol::thinking;

pub const ANTHROPIC_MESSAGES_PATH: &str = "/v1/messages";

/// Anthropic Messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl RequestBuilder for AnthropicAdapter {
    fn sanitizers(&self) -> &'static [Sanitizer] {
        &[Sanitizer::PruneEmptyTurns]
    }

    fn build(
        &self,
        request: &CanonicalRequest,
        _rng: &mut fastrand::Rng,
    ) -> Result<UpstreamRequest, AdapterError> {
        let settings = thinking::normalize(request.thinking.as_ref());
        let wire = encode_anthropic_request(request, settings)?;
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        Ok(UpstreamRequest {
            path: ANTHROPIC_MESSAGES_PATH.to_string(),
            headers,
            body: to_json_body(&wire)?,
        })
    }
}

impl ResponseMapper for AnthropicAdapter {
    fn map_response(
        &self,
        body: &[u8],
        meta: &ResponseMeta,
    ) -> Result<CanonicalResponse, AdapterError> {
        decode_anthropic_response_body(body, meta)
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn stream_decoder(&self, state: StreamState) -> Box<dyn StreamDecoder> {
        Box::new(AnthropicStreamDecoder::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{CanonicalMessage, CanonicalRole};

    #[test]
    fn test_build_sets_version_and_native_thinking() {
        let mut request = CanonicalRequest::new(
            "claude-sonnet-4",
            vec![CanonicalMessage::text(CanonicalRole::User, "hi")],
        );
        request.thinking = serde_json::from_value(serde_json::json!(true)).ok();
        let built = AnthropicAdapter
            .build(&request, &mut fastrand::Rng::with_seed(1))
            .unwrap();
        assert_eq!(built.path, ANTHROPIC_MESSAGES_PATH);
        assert_eq!(built.headers["anthropic-version"], ANTHROPIC_VERSION);
        assert_eq!(built.body["thinking"]["type"], "enabled");
        assert_eq!(
            built.body["thinking"]["budget_tokens"],
            thinking::DEFAULT_THINKING_BUDGET
        );
        assert!(built.body.get("system").is_none());
    }
}
