/// Error type shared by every stage of the adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Upstream protocol error: status={status}, message={message}")]
    UpstreamProtocol { status: u16, message: String },
    #[error("Upstream transport error: {message}")]
    UpstreamTransport { message: String, timeout: bool },
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status reported for protocol faults that did not come with an upstream HTTP status.
pub const PROTOCOL_FAULT_STATUS: u16 = 502;

impl AdapterError {
    /// Protocol fault detected while reading an otherwise successful upstream response.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::UpstreamProtocol {
            status: PROTOCOL_FAULT_STATUS,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::UpstreamTransport {
            message: message.into(),
            timeout: false,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdapterError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            AdapterError::Credential(_) => ErrorCategory::Unavailable,
            AdapterError::UpstreamProtocol { status, .. } => category_from_upstream_status(*status),
            AdapterError::UpstreamTransport { timeout: true, .. } => ErrorCategory::Timeout,
            AdapterError::UpstreamTransport { timeout: false, .. } => ErrorCategory::BadGateway,
            AdapterError::Config(_) | AdapterError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    /// OpenAI-style `error.type` string.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            AdapterError::Config(_) => "config_error",
            AdapterError::InvalidRequest(_) => "invalid_request_error",
            AdapterError::Credential(_) => "credential_error",
            AdapterError::UpstreamProtocol { .. } => "upstream_protocol_error",
            AdapterError::UpstreamTransport { .. } => "upstream_transport_error",
            AdapterError::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        http_status_for_category(self.category())
    }

    /// `{"error": {"message", "type", "code"}}` body, used for JSON responses and
    /// for the terminal SSE error event.
    #[must_use]
    pub fn error_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": self.http_status().as_u16(),
            }
        })
    }
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    Unavailable,
    Timeout,
    BadGateway,
    ServerError,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 404 | 413 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        503 | 529 => ErrorCategory::Unavailable,
        504 => ErrorCategory::Timeout,
        _ => ErrorCategory::BadGateway,
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::Unavailable => http::StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Timeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

impl axum::response::IntoResponse for AdapterError {
    fn into_response(self) -> axum::response::Response {
        (self.http_status(), axum::Json(self.error_payload())).into_response()
    }
}
