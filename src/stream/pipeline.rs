//! Upstream byte stream to canonical SSE body.
//!
//! One decoder per stream, owned by the stream. Frames are produced in upstream
//! order; cancellation stops consumption at the next poll and drops the upstream.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::StreamDecoder;
use crate::error::AdapterError;
use crate::observability::CallOutcome;
use crate::protocol::canonical::{CanonicalChunk, Usage};
use crate::protocol::openai_chat::encoder::encode_chunk;
use crate::stream::sse::{done_frame, error_frame, openai_sse_frame};

/// What the caller learns when a stream ends, however it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Usage from the terminal chunk, if the stream got that far.
    pub usage: Option<Usage>,
    pub result: CallOutcome,
}

/// Called exactly once per stream.
pub type StreamCompletion = Box<dyn FnOnce(StreamOutcome) + Send>;

type UpstreamBytes = Pin<Box<dyn Stream<Item = Result<Bytes, AdapterError>> + Send>>;

struct PipelineState {
    upstream: Option<UpstreamBytes>,
    decoder: Box<dyn StreamDecoder>,
    cancel: CancellationToken,
    chunks: Vec<CanonicalChunk>,
    pending: VecDeque<Bytes>,
    finished: bool,
    usage: Option<Usage>,
    completion: Option<StreamCompletion>,
}

impl PipelineState {
    fn complete(&mut self, result: CallOutcome) {
        self.finished = true;
        // Release the upstream connection now rather than when the body is dropped.
        self.upstream = None;
        if let Some(hook) = self.completion.take() {
            hook(StreamOutcome {
                usage: self.usage,
                result,
            });
        }
    }

    fn fail(&mut self, err: &AdapterError) {
        warn!(error = %err, "stream ended with error");
        self.pending.push_back(Bytes::from(error_frame(err)));
        self.complete(CallOutcome::Failed);
    }

    /// Encode decoded chunks; emits `[DONE]` once the decoder reaches its terminal phase.
    fn flush_chunks(&mut self) -> Result<(), AdapterError> {
        for chunk in self.chunks.drain(..) {
            if chunk.usage.is_some() {
                self.usage = chunk.usage;
            }
            let json = encode_chunk(&chunk, self.decoder.state())?;
            self.pending.push_back(Bytes::from(openai_sse_frame(&json)));
        }
        if self.decoder.is_done() && !self.finished {
            self.pending.push_back(Bytes::from_static(done_frame().as_bytes()));
            self.complete(CallOutcome::Completed);
        }
        Ok(())
    }

    /// Run one decoder step, then flush whatever it produced before reporting its error.
    fn absorb(&mut self, step: Result<(), AdapterError>) {
        let flushed = self.flush_chunks();
        if let Err(err) = step.and(flushed) {
            self.fail(&err);
        }
    }

    fn on_upstream_item(&mut self, item: Option<Result<Bytes, AdapterError>>) {
        match item {
            Some(Ok(bytes)) => {
                let step = self.decoder.feed(&bytes, &mut self.chunks);
                self.absorb(step);
            }
            Some(Err(err)) => self.fail(&err),
            None => {
                let step = self.decoder.finish(&mut self.chunks);
                self.absorb(step);
                if !self.finished {
                    // finish() succeeded without reaching Done.
                    self.fail(&AdapterError::protocol("upstream stream ended without a finish event"));
                }
            }
        }
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        if let Some(hook) = self.completion.take() {
            debug!("stream dropped before completion");
            hook(StreamOutcome {
                usage: self.usage,
                result: CallOutcome::Cancelled,
            });
        }
    }
}

/// Drive `decoder` over `upstream` and yield canonical SSE frames:
/// one `data:` frame per chunk, then `data: [DONE]`.
///
/// A decode or transport error yields one error frame and ends the stream
/// without `[DONE]`. When `cancel` fires, the stream ends at once with no
/// further frame.
pub fn canonical_sse_stream<S>(
    upstream: S,
    decoder: Box<dyn StreamDecoder>,
    cancel: CancellationToken,
    completion: Option<StreamCompletion>,
) -> impl Stream<Item = Bytes> + Send + 'static
where
    S: Stream<Item = Result<Bytes, AdapterError>> + Send + 'static,
{
    let state = PipelineState {
        upstream: Some(Box::pin(upstream)),
        decoder,
        cancel,
        chunks: Vec::with_capacity(4),
        pending: VecDeque::with_capacity(4),
        finished: false,
        usage: None,
        completion,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() {
                if !state.finished {
                    debug!("stream cancelled");
                    state.pending.clear();
                    state.complete(CallOutcome::Cancelled);
                }
                return None;
            }
            if let Some(frame) = state.pending.pop_front() {
                return Some((frame, state));
            }
            if state.finished {
                return None;
            }
            let Some(upstream) = state.upstream.as_mut() else {
                return None;
            };
            let item = tokio::select! {
                biased;
                () = state.cancel.cancelled() => continue,
                item = upstream.next() => item,
            };
            state.on_upstream_item(item);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures_util::stream;

    use super::*;
    use crate::adapter::{for_provider, ProviderAdapter};
    use crate::protocol::canonical::{ProviderKind, ResponseMeta, StreamState};

    fn gemini_decoder() -> Box<dyn StreamDecoder> {
        let adapter: &dyn ProviderAdapter = for_provider(ProviderKind::Gemini);
        adapter.stream_decoder(StreamState::new(&ResponseMeta::new("chatcmpl-p", "gemini-2.5-pro", 1)))
    }

    fn recorder() -> (Arc<Mutex<Vec<StreamOutcome>>>, StreamCompletion) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: StreamCompletion = Box::new(move |outcome| sink.lock().unwrap().push(outcome));
        (seen, hook)
    }

    fn text(frames: &[Bytes]) -> Vec<String> {
        frames
            .iter()
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    const FIRST: &str = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}],\"role\":\"model\"}}]}\n\n";
    const LAST: &str = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}],\"role\":\"model\"},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":1,\"candidatesTokenCount\":2,\"totalTokenCount\":3}}\n\n";

    #[tokio::test]
    async fn test_frames_then_done() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(FIRST.as_bytes())),
            Ok(Bytes::from_static(LAST.as_bytes())),
        ]);
        let (seen, hook) = recorder();
        let frames: Vec<Bytes> =
            canonical_sse_stream(upstream, gemini_decoder(), CancellationToken::new(), Some(hook))
                .collect()
                .await;
        let frames = text(&frames);

        assert_eq!(frames.len(), 4);
        assert!(frames[0].contains("\"role\":\"assistant\""));
        assert!(frames[0].contains("\"content\":\"Hi\""));
        assert!(frames[1].contains("\"content\":\"!\""));
        assert!(!frames[1].contains("\"role\""));
        assert!(frames[2].contains("\"finish_reason\":\"stop\""));
        assert_eq!(frames[3], "data: [DONE]\n\n");
        let outcomes = seen.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, CallOutcome::Completed);
        assert_eq!(outcomes[0].usage.map(|u| u.total_tokens), Some(3));
    }

    #[tokio::test]
    async fn test_truncated_upstream_emits_error_without_done() {
        let upstream = stream::iter(vec![Ok(Bytes::from_static(FIRST.as_bytes()))]);
        let (seen, hook) = recorder();
        let frames: Vec<Bytes> =
            canonical_sse_stream(upstream, gemini_decoder(), CancellationToken::new(), Some(hook))
                .collect()
                .await;
        let frames = text(&frames);

        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("\"error\""));
        assert!(frames.iter().all(|f| !f.contains("[DONE]")));
        assert_eq!(seen.lock().unwrap()[0].result, CallOutcome::Failed);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from_static(FIRST.as_bytes())),
            Err(AdapterError::transport("connection reset")),
        ]);
        let frames: Vec<Bytes> =
            canonical_sse_stream(upstream, gemini_decoder(), CancellationToken::new(), None)
                .collect()
                .await;
        let frames = text(&frames);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancel_stops_without_done() {
        let cancel = CancellationToken::new();
        let upstream = stream::iter(vec![Ok(Bytes::from_static(FIRST.as_bytes()))])
            .chain(stream::pending());
        let (seen, hook) = recorder();
        let mut body = Box::pin(canonical_sse_stream(upstream, gemini_decoder(), cancel.clone(), Some(hook)));

        let first = body.next().await.unwrap();
        assert!(String::from_utf8_lossy(&first).contains("Hi"));
        cancel.cancel();
        assert!(body.next().await.is_none());
        assert_eq!(seen.lock().unwrap()[0].result, CallOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_body_reports_cancelled() {
        let upstream = stream::iter(vec![Ok(Bytes::from_static(FIRST.as_bytes()))])
            .chain(stream::pending());
        let (seen, hook) = recorder();
        let mut body = Box::pin(canonical_sse_stream(
            upstream,
            gemini_decoder(),
            CancellationToken::new(),
            Some(hook),
        ));
        let _ = body.next().await;
        drop(body);
        let outcomes = seen.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, CallOutcome::Cancelled);
    }
}
