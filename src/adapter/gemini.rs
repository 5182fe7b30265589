use http::HeaderMap;

use super::{to_json_body, ProviderAdapter, RequestBuilder, ResponseMapper, StreamDecoder, UpstreamRequest};
use crate::error::AdapterError;
use crate::protocol::canonical::{CanonicalRequest, CanonicalResponse, ProviderKind, ResponseMeta, StreamState};
use crate::protocol::gemini::encoder::encode_gemini_request;
use crate::protocol::gemini::parse_gemini_payload;
use crate::protocol::gemini::response_decoder::decode_gemini_response;
use crate::protocol::gemini::stream::GeminiStreamDecoder;
use crate::protocol::sanitize::Sanitizer;
use crate::protocol::thinking;

/// Gemini `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

#[must_use]
pub fn gemini_path(model: &str, stream: bool) -> String {
    if stream {
        format!("/v1beta/models/{model}:streamGenerateContent?alt=sse")
    } else {
        format!("/v1beta/models/{model}:generateContent")
    }
}

impl RequestBuilder for GeminiAdapter {
    fn sanitizers(&self) -> &'static [Sanitizer] {
        &[Sanitizer::PruneEmptyTurns]
    }

    fn build(
        &self,
        request: &CanonicalRequest,
        _rng: &mut fastrand::Rng,
    ) -> Result<UpstreamRequest, AdapterError> {
        let settings = thinking::normalize(request.thinking.as_ref());
        let wire = encode_gemini_request(request, settings)?;
        Ok(UpstreamRequest {
            path: gemini_path(&request.model, request.stream),
            headers: HeaderMap::new(),
            body: to_json_body(&wire)?,
        })
    }
}

impl ResponseMapper for GeminiAdapter {
    fn map_response(
        &self,
        body: &[u8],
        meta: &ResponseMeta,
    ) -> Result<CanonicalResponse, AdapterError> {
        let response = parse_gemini_payload(body)?;
        decode_gemini_response(&response, meta)
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn stream_decoder(&self, state: StreamState) -> Box<dyn StreamDecoder> {
        Box::new(GeminiStreamDecoder::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::{CanonicalMessage, CanonicalRole};

    #[test]
    fn test_paths() {
        assert_eq!(
            gemini_path("gemini-2.5-pro", true),
            "/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            gemini_path("gemini-2.5-pro", false),
            "/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn test_build_uses_native_thinking() {
        let mut request = CanonicalRequest::new(
            "gemini-2.5-pro",
            vec![CanonicalMessage::text(CanonicalRole::User, "hi")],
        );
        request.thinking = serde_json::from_value(serde_json::json!({"budget_tokens": 512})).ok();
        request.stream = true;
        let built = GeminiAdapter
            .build(&request, &mut fastrand::Rng::with_seed(1))
            .unwrap();
        assert!(built.path.ends_with(":streamGenerateContent?alt=sse"));
        assert_eq!(
            built.body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            512
        );
        // No hint text is injected for a native thinking switch.
        assert!(built.body.get("systemInstruction").is_none());
    }
}
