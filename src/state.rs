use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, UpstreamServiceConfig};
use crate::credentials::{ConfigCredentialStore, CredentialStore};
use crate::error::AdapterError;
use crate::observability::{TracingUsageRecorder, UsageRecorder};
use crate::protocol::canonical::ProviderKind;
use crate::routing::ModelRouter;
use crate::transport::HttpTransport;

/// One configured upstream with its provider resolved once at start-up.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub config: UpstreamServiceConfig,
    pub provider: ProviderKind,
    /// `base_url` without a trailing slash.
    pub base_url: String,
}

/// Shared application state accessible to all handlers. Immutable after start-up.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub model_router: ModelRouter,
    upstreams: Vec<Upstream>,
    credentials: Arc<dyn CredentialStore>,
    usage: Arc<dyn UsageRecorder>,
    shutdown: CancellationToken,
    rng_seed: u64,
    request_seq: AtomicU64,
}

impl AppState {
    /// State with the default collaborators: credentials from config, usage to `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when an upstream names an unknown provider
    /// or the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, AdapterError> {
        let credentials = Arc::new(ConfigCredentialStore::from_services(&config.upstream_services));
        Self::new(config, credentials, Arc::new(TracingUsageRecorder))
    }

    /// # Errors
    ///
    /// Same as [`AppState::from_config`].
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        usage: Arc<dyn UsageRecorder>,
    ) -> Result<Self, AdapterError> {
        let upstreams = config
            .upstream_services
            .iter()
            .map(|svc| {
                let provider = svc.provider_kind().ok_or_else(|| {
                    AdapterError::Config(format!(
                        "upstream '{}' has unknown provider '{}'",
                        svc.name, svc.provider
                    ))
                })?;
                Ok(Upstream {
                    config: svc.clone(),
                    provider,
                    base_url: svc.base_url.trim().trim_end_matches('/').to_string(),
                })
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;
        let transport = HttpTransport::new(&config.server)?;
        let model_router = ModelRouter::new(&config);

        Ok(Self {
            config,
            transport,
            model_router,
            upstreams,
            credentials,
            usage,
            shutdown: CancellationToken::new(),
            rng_seed: fastrand::u64(..),
            request_seq: AtomicU64::new(1),
        })
    }

    /// Fix the per-request generator seed so ids are reproducible.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Generator owned by one request; ids and continuation ids come from it.
    #[must_use]
    pub fn request_rng(&self, request_seq: u64) -> fastrand::Rng {
        fastrand::Rng::with_seed(self.rng_seed ^ request_seq.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    #[must_use]
    pub fn upstream(&self, upstream_index: usize) -> Option<&Upstream> {
        self.upstreams.get(upstream_index)
    }

    #[must_use]
    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn usage_recorder(&self) -> Arc<dyn UsageRecorder> {
        Arc::clone(&self.usage)
    }

    /// Fires on process shutdown; every stream runs under a child of it.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn state() -> AppState {
        let config = parse_config(
            r#"
upstream_services:
  - name: claude
    provider: anthropic
    base_url: https://api.anthropic.com/
    credential:
      api_key: a
    models: [claude-sonnet-4]
"#,
        )
        .unwrap();
        AppState::from_config(config).unwrap()
    }

    #[test]
    fn test_upstreams_resolved() {
        let state = state();
        let upstream = state.upstream(0).unwrap();
        assert_eq!(upstream.provider, ProviderKind::Anthropic);
        assert_eq!(upstream.base_url, "https://api.anthropic.com");
        assert!(state.upstream(1).is_none());
        assert!(state.credentials().credential_for("claude").is_ok());
        assert!(state.credentials().credential_for("other").is_err());
    }

    #[test]
    fn test_request_rng_is_seeded_per_request() {
        let state = state().with_rng_seed(7);
        let a = state.request_rng(1).u64(..);
        let b = state.request_rng(1).u64(..);
        let c = state.request_rng(2).u64(..);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(state.next_request_seq(), 1);
        assert_eq!(state.next_request_seq(), 2);
    }
}
