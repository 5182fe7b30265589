pub mod headers;
mod http_transport;

pub use headers::{no_buffer_headers, sse_response};
pub use http_transport::{byte_stream, read_body, HttpTransport};
