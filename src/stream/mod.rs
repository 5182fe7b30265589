pub mod pipeline;
pub mod sse;

pub use pipeline::{canonical_sse_stream, StreamCompletion, StreamOutcome};
pub use sse::{SseByteDecoder, SseEvent, SseParser};
