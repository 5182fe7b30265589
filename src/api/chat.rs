//! `POST /v1/chat/completions`: canonical request in, canonical JSON or SSE out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use http::HeaderValue;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::adapter::{for_provider, ProviderAdapter, UpstreamRequest};
use crate::credentials::apply_credential;
use crate::error::AdapterError;
use crate::observability::token_counter::estimate_request_tokens;
use crate::observability::{CallOutcome, UsageRecord, UsageRecorder};
use crate::protocol::canonical::{CanonicalRequest, ProviderKind, ResponseMeta, StreamState, Usage};
use crate::protocol::openai_chat::encoder::encode_response;
use crate::protocol::sanitize::{run_plan, Sanitizer};
use crate::state::{AppState, Upstream};
use crate::stream::{canonical_sse_stream, StreamCompletion};
use crate::transport::{byte_stream, read_body, sse_response};
use crate::util::{response_id, unix_now_secs};

pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handler_inner(state, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Reports one finished call to the usage recorder.
struct CallReport {
    recorder: Arc<dyn UsageRecorder>,
    model: String,
    upstream: String,
    provider: ProviderKind,
    stream: bool,
    started: Instant,
}

impl CallReport {
    fn finish(self, usage: Option<Usage>, outcome: CallOutcome) {
        self.recorder.record(UsageRecord {
            model: self.model,
            upstream: self.upstream,
            provider: self.provider,
            usage,
            stream: self.stream,
            outcome,
            latency: self.started.elapsed(),
        });
    }
}

pub(crate) fn parse_request(body: &[u8]) -> Result<CanonicalRequest, AdapterError> {
    let request: CanonicalRequest = serde_json::from_slice(body)
        .map_err(|err| AdapterError::InvalidRequest(format!("invalid request body: {err}")))?;
    if request.model.trim().is_empty() {
        return Err(AdapterError::InvalidRequest("model is required".to_string()));
    }
    if request.messages.is_empty() {
        return Err(AdapterError::InvalidRequest("messages is empty".to_string()));
    }
    Ok(request)
}

/// Sanitizers for `upstream`: image stripping first when the upstream is text-only,
/// then whatever the provider needs.
pub(crate) fn sanitizer_plan(
    upstream: &Upstream,
    adapter: &dyn ProviderAdapter,
) -> SmallVec<[Sanitizer; 4]> {
    let mut plan = SmallVec::new();
    if upstream.config.text_only {
        plan.push(Sanitizer::StripImages);
    }
    plan.extend_from_slice(adapter.sanitizers());
    plan
}

async fn handler_inner(state: Arc<AppState>, body: Bytes) -> Result<Response, AdapterError> {
    let started = Instant::now();
    let request_seq = state.next_request_seq();
    let mut request = parse_request(&body)?;
    if request.thinking.is_none() {
        request.thinking = state.config.features.default_thinking.clone();
    }

    let (upstream_index, actual_model) = {
        let route = state.model_router.resolve(&request.model)?;
        (route.upstream_index, route.actual_model.to_string())
    };
    let upstream = state.upstream(upstream_index).ok_or_else(|| {
        AdapterError::Internal(format!("route points at missing upstream {upstream_index}"))
    })?;
    let adapter = for_provider(upstream.provider);
    let client_model = std::mem::replace(&mut request.model, actual_model);
    let stream = request.stream;

    let plan = sanitizer_plan(upstream, adapter);
    let request = run_plan(request, &plan)?;
    debug!(
        request_seq,
        upstream = %upstream.config.name,
        provider = %upstream.provider,
        model = %request.model,
        messages = request.messages.len(),
        stream,
        "request shaped for upstream"
    );

    let mut rng = state.request_rng(request_seq);
    let UpstreamRequest {
        path,
        mut headers,
        body,
    } = adapter.build(&request, &mut rng)?;
    if let (ProviderKind::Anthropic, Some(version)) =
        (upstream.provider, upstream.config.anthropic_version.as_deref())
    {
        let value = HeaderValue::from_str(version).map_err(|_| {
            AdapterError::Config(format!("invalid anthropic_version '{version}'"))
        })?;
        headers.insert("anthropic-version", value);
    }
    let credential = state.credentials().credential_for(&upstream.config.name)?;
    apply_credential(upstream.provider, &credential, &mut headers)?;

    let meta = ResponseMeta::new(response_id(&mut rng), client_model.clone(), unix_now_secs())
        .with_prompt_estimate(estimate_request_tokens(&request));
    let report = CallReport {
        recorder: state.usage_recorder(),
        model: client_model,
        upstream: upstream.config.name.clone(),
        provider: upstream.provider,
        stream,
        started,
    };

    let url = format!("{}{}", upstream.base_url, path);
    let response = match state.transport.send(&url, headers, &body).await {
        Ok(response) => response,
        Err(err) => {
            report.finish(None, CallOutcome::Failed);
            return Err(err);
        }
    };

    if stream {
        let decoder = adapter.stream_decoder(StreamState::new(&meta));
        let cancel = state.shutdown_token().child_token();
        let completion: StreamCompletion =
            Box::new(move |outcome| report.finish(outcome.usage, outcome.result));
        let frames = canonical_sse_stream(byte_stream(response), decoder, cancel, Some(completion));
        return Ok(sse_response(Body::from_stream(
            frames.map(Ok::<Bytes, Infallible>),
        )));
    }

    let mapped = match read_body(response).await {
        Ok(bytes) => adapter.map_response(&bytes, &meta),
        Err(err) => Err(err),
    };
    match mapped {
        Ok(canonical) => {
            info!(
                request_seq,
                finish_reason = canonical.finish_reason.as_str(),
                "non-streaming response mapped"
            );
            report.finish(canonical.usage, CallOutcome::Completed);
            Ok(Json(encode_response(&canonical)).into_response())
        }
        Err(err) => {
            report.finish(None, CallOutcome::Failed);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_parse_request_rejects_empty() {
        let err = parse_request(br#"{"model":"m","messages":[]}"#).unwrap_err();
        assert!(err.to_string().contains("messages is empty"));
        let err = parse_request(br#"{"model":"","messages":[{"role":"user","content":"hi"}]}"#)
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRequest(_)));
        assert!(matches!(
            parse_request(b"not json").unwrap_err(),
            AdapterError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_parse_request_accepts_canonical_body() {
        let request = parse_request(
            br#"{"model":"m","stream":true,"max_completion_tokens":64,
                 "messages":[{"role":"system","content":"s"},{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert!(request.stream);
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn test_sanitizer_plan_text_only_first() {
        let config = parse_config(
            r#"
upstream_services:
  - name: k
    provider: kiro
    base_url: https://q.example.com
    credential:
      bearer: t
    models: [claude-sonnet-4]
    text_only: true
"#,
        )
        .unwrap();
        let state = AppState::from_config(config).unwrap();
        let upstream = state.upstream(0).unwrap();
        let plan = sanitizer_plan(upstream, for_provider(upstream.provider));
        assert_eq!(
            plan.as_slice(),
            &[
                Sanitizer::StripImages,
                Sanitizer::PruneEmptyTurns,
                Sanitizer::MergeAdjacentTurns
            ]
        );
    }
}
