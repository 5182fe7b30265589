use crate::adapter::StreamDecoder;
use crate::error::AdapterError;
use crate::protocol::accumulate::ChunkAccumulator;
use crate::protocol::canonical::{CanonicalResponse, ResponseMeta, StreamState};
use crate::protocol::kiro::stream::KiroStreamDecoder;

/// Map a complete Kiro event-stream body to one canonical response.
///
/// # Errors
///
/// Returns [`AdapterError::UpstreamProtocol`] for exception frames or a truncated body.
pub fn decode_kiro_response(
    body: &[u8],
    meta: &ResponseMeta,
) -> Result<CanonicalResponse, AdapterError> {
    let mut decoder = KiroStreamDecoder::new(StreamState::new(meta));
    let mut chunks = Vec::new();
    decoder.feed(body, &mut chunks)?;
    decoder.finish(&mut chunks)?;

    let mut accumulator = ChunkAccumulator::new();
    accumulator.extend(&chunks);
    Ok(accumulator.into_response(meta))
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::protocol::canonical::FinishReason;
    use crate::protocol::kiro::eventstream::{encode_event, encode_frame};

    #[test]
    fn test_folds_event_stream() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&encode_event("assistantResponseEvent", br#"{"content":"4"}"#));
        body.extend_from_slice(&encode_event("assistantResponseEvent", br#"{"content":"2"}"#));
        let meta = ResponseMeta::new("chatcmpl-z", "m", 1).with_prompt_estimate(5);
        let response = decode_kiro_response(&body, &meta).unwrap();
        assert_eq!(response.message.content.as_deref(), Some("42"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.map(|u| (u.prompt_tokens, u.completion_tokens)), Some((5, 1)));
    }

    #[test]
    fn test_exception_frame_fails() {
        let body = encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "ValidationException"),
            ],
            br#"{"message":"Improperly formed request."}"#,
        );
        let err = decode_kiro_response(&body, &ResponseMeta::new("x", "m", 1)).unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamProtocol { status: 400, .. }));
    }
}
