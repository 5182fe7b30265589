use std::time::Duration;

use tracing::{info, warn};

use crate::protocol::canonical::{ProviderKind, Usage};

/// How a call ended, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl CallOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Completed => "completed",
            CallOutcome::Failed => "failed",
            CallOutcome::Cancelled => "cancelled",
        }
    }
}

/// One finished upstream call.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub model: String,
    pub upstream: String,
    pub provider: ProviderKind,
    pub usage: Option<Usage>,
    pub stream: bool,
    pub outcome: CallOutcome,
    pub latency: Duration,
}

/// Collaborator invoked once per finished call. Quota and billing live behind it.
pub trait UsageRecorder: Send + Sync {
    fn record(&self, record: UsageRecord);
}

/// Default recorder: one structured log line per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageRecorder;

impl UsageRecorder for TracingUsageRecorder {
    fn record(&self, record: UsageRecord) {
        let usage = record.usage.unwrap_or_default();
        match record.outcome {
            CallOutcome::Completed => info!(
                model = %record.model,
                upstream = %record.upstream,
                provider = %record.provider,
                stream = record.stream,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                thoughts_tokens = usage.thoughts_tokens.unwrap_or(0),
                duration_seconds = record.latency.as_secs_f64(),
                "request completed"
            ),
            CallOutcome::Failed | CallOutcome::Cancelled => warn!(
                model = %record.model,
                upstream = %record.upstream,
                provider = %record.provider,
                stream = record.stream,
                outcome = record.outcome.as_str(),
                duration_seconds = record.latency.as_secs_f64(),
                "request did not complete"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{UsageRecord, UsageRecorder};

    /// Keeps every record for assertions.
    #[derive(Debug, Default)]
    pub struct CollectingUsageRecorder {
        pub records: Mutex<Vec<UsageRecord>>,
    }

    impl UsageRecorder for CollectingUsageRecorder {
        fn record(&self, record: UsageRecord) {
            if let Ok(mut records) = self.records.lock() {
                records.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CollectingUsageRecorder;
    use super::*;

    #[test]
    fn test_recorder_trait_object() {
        let collector = CollectingUsageRecorder::default();
        let recorder: &dyn UsageRecorder = &collector;
        recorder.record(UsageRecord {
            model: "m".into(),
            upstream: "u".into(),
            provider: ProviderKind::Gemini,
            usage: Some(Usage::from_counts(1, 2, None, None)),
            stream: true,
            outcome: CallOutcome::Completed,
            latency: Duration::from_millis(5),
        });
        TracingUsageRecorder.record(collector.records.lock().unwrap()[0].clone());
        assert_eq!(collector.records.lock().unwrap().len(), 1);
        assert_eq!(CallOutcome::Cancelled.as_str(), "cancelled");
    }
}
