use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::AdapterError;

/// Longest upstream error body echoed back to the client.
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, AdapterError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| AdapterError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Upstream HTTP client. One per process; reqwest pools connections internally.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with connection pooling and timeouts from the server config.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when the client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, AdapterError> {
        let pool_idle_timeout = (config.http_pool_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(config.http_pool_idle_timeout_secs));
        let client = build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.connect_timeout),
            Duration::from_secs(config.timeout),
            config.http_use_env_proxy,
        )?;
        Ok(Self { client })
    }

    /// POST a JSON body. Any 2xx response is returned unread; anything else is
    /// read and turned into [`AdapterError::UpstreamProtocol`] with the upstream status.
    ///
    /// # Errors
    ///
    /// [`AdapterError::UpstreamTransport`] on connect, send or timeout failures;
    /// [`AdapterError::UpstreamProtocol`] on a non-2xx status.
    pub async fn send(
        &self,
        url: &str,
        mut headers: HeaderMap,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AdapterError> {
        let payload = serde_json::to_vec(body).map_err(|err| {
            AdapterError::Internal(format!("failed to serialize upstream body: {err}"))
        })?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(url, bytes = payload.len(), "sending upstream request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = upstream_error_message(&text);
        warn!(status = status.as_u16(), message = %message, "upstream returned error status");
        Err(AdapterError::UpstreamProtocol {
            status: status.as_u16(),
            message,
        })
    }
}

/// Read the full body of a successful response.
///
/// # Errors
///
/// Returns [`AdapterError::UpstreamTransport`] when the body cannot be read.
pub async fn read_body(response: reqwest::Response) -> Result<Bytes, AdapterError> {
    response.bytes().await.map_err(map_reqwest_error)
}

/// Body of a successful response as a byte stream with adapter errors.
pub fn byte_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Bytes, AdapterError>> + Send + 'static {
    response
        .bytes_stream()
        .map(|item| item.map_err(map_reqwest_error))
}

fn map_reqwest_error(err: reqwest::Error) -> AdapterError {
    AdapterError::UpstreamTransport {
        timeout: err.is_timeout(),
        message: err.to_string(),
    }
}

/// Pull a readable message out of an upstream error body.
///
/// Understands `{"error":{"message":..}}`, `{"error":".."}` and `{"message":..}`;
/// falls back to a bounded prefix of the raw text.
pub(crate) fn upstream_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let found = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = found {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty upstream error body".to_string();
    }
    trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}
