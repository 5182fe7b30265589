use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::HeaderMap;

/// Headers that keep intermediaries from buffering a streamed body.
#[must_use]
pub fn no_buffer_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers
}

/// Wrap an SSE body with the no-buffer headers and `text/event-stream`.
pub fn sse_response(body: Body) -> Response {
    let mut headers = no_buffer_headers();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    (headers, body).into_response()
}
