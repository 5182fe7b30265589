//! Capability traits over the three upstream protocols and the single place where
//! a [`ProviderKind`] is turned into behavior.

mod anthropic;
mod gemini;
mod kiro;

use http::HeaderMap;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use kiro::KiroAdapter;

use crate::error::AdapterError;
use crate::protocol::canonical::{
    CanonicalChunk, CanonicalRequest, CanonicalResponse, ProviderKind, ResponseMeta, StreamState,
};
use crate::protocol::sanitize::Sanitizer;

/// Upstream call produced by a [`RequestBuilder`].
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Path appended to the upstream base URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Turns a sanitized canonical request into the upstream wire request.
pub trait RequestBuilder: Send + Sync {
    /// Sanitizers this upstream needs, in order.
    fn sanitizers(&self) -> &'static [Sanitizer];

    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] when the request cannot be
    /// expressed in the upstream protocol.
    fn build(
        &self,
        request: &CanonicalRequest,
        rng: &mut fastrand::Rng,
    ) -> Result<UpstreamRequest, AdapterError>;
}

/// Incremental upstream-bytes to canonical-chunks decoder, one per stream.
pub trait StreamDecoder: Send {
    /// Consume the next slice of upstream bytes, appending finished chunks.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] on malformed or error events.
    fn feed(&mut self, bytes: &[u8], out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError>;

    /// Upstream reached EOF.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] when the stream ended early.
    fn finish(&mut self, out: &mut Vec<CanonicalChunk>) -> Result<(), AdapterError>;

    fn state(&self) -> &StreamState;

    fn is_done(&self) -> bool {
        self.state().is_done()
    }
}

/// Maps one complete upstream response body to a canonical response.
pub trait ResponseMapper: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AdapterError::UpstreamProtocol`] when the body does not match
    /// the upstream schema.
    fn map_response(
        &self,
        body: &[u8],
        meta: &ResponseMeta,
    ) -> Result<CanonicalResponse, AdapterError>;
}

/// Everything the request path needs from one upstream protocol.
pub trait ProviderAdapter: RequestBuilder + ResponseMapper {
    fn kind(&self) -> ProviderKind;

    fn stream_decoder(&self, state: StreamState) -> Box<dyn StreamDecoder>;
}

#[must_use]
pub fn for_provider(kind: ProviderKind) -> &'static dyn ProviderAdapter {
    match kind {
        ProviderKind::Gemini => &GeminiAdapter,
        ProviderKind::Anthropic => &AnthropicAdapter,
        ProviderKind::Kiro => &KiroAdapter,
    }
}

fn to_json_body<T: serde::Serialize>(wire: &T) -> Result<serde_json::Value, AdapterError> {
    serde_json::to_value(wire)
        .map_err(|e| AdapterError::Internal(format!("failed to serialize upstream request: {e}")))
}
