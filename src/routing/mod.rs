pub mod dispatch;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::AppConfig;
use crate::error::AdapterError;

/// The resolved target for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget<'a> {
    pub upstream_index: usize,
    /// Model name sent upstream (the real name behind an alias).
    pub actual_model: &'a str,
}

#[derive(Debug, Clone)]
struct Candidate {
    upstream_index: usize,
    actual_model: Arc<str>,
}

/// Model and alias index over the configured upstreams.
///
/// A model listed by several upstreams routes to the first one in config order.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    model_index: FxHashMap<String, Candidate>,
    default_upstream: Option<usize>,
}

impl ModelRouter {
    /// Build a `ModelRouter` from the application configuration.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let mut model_index: FxHashMap<String, Candidate> = FxHashMap::default();

        for (idx, svc) in config.upstream_services.iter().enumerate() {
            for entry in &svc.models {
                let (requested, actual) = entry
                    .split_once(':')
                    .unwrap_or((entry.as_str(), entry.as_str()));
                model_index
                    .entry(requested.to_string())
                    .or_insert_with(|| Candidate {
                        upstream_index: idx,
                        actual_model: Arc::from(actual),
                    });
            }
        }

        let default_upstream = config
            .upstream_services
            .iter()
            .position(|svc| svc.is_default);

        Self {
            model_index,
            default_upstream,
        }
    }

    #[must_use]
    pub fn known_model_count(&self) -> usize {
        self.model_index.len()
    }

    /// Requested model names (exact names and aliases), sorted.
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.model_index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve which upstream service and actual model name to use.
    ///
    /// Resolution order:
    /// 1. Exact model or alias match.
    /// 2. The default upstream, with the model name passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::InvalidRequest` when no route can be resolved.
    pub fn resolve<'a>(&'a self, model: &'a str) -> Result<RouteTarget<'a>, AdapterError> {
        if let Some(candidate) = self.model_index.get(model) {
            return Ok(RouteTarget {
                upstream_index: candidate.upstream_index,
                actual_model: &candidate.actual_model,
            });
        }
        match self.default_upstream {
            Some(upstream_index) => Ok(RouteTarget {
                upstream_index,
                actual_model: model,
            }),
            None => Err(AdapterError::InvalidRequest(format!(
                "No upstream found for model '{model}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, AppConfig};

    fn config(default_on_second: bool) -> AppConfig {
        let yaml = format!(
            r#"
upstream_services:
  - name: gemini
    provider: gemini
    base_url: https://generativelanguage.googleapis.com
    credential:
      api_key: g
    models: [gemini-2.5-pro, "fast:gemini-2.5-flash", shared]
  - name: claude
    provider: anthropic
    base_url: https://api.anthropic.com
    credential:
      api_key: a
    models: [claude-sonnet-4, shared]
    is_default: {default_on_second}
"#
        );
        parse_config(&yaml).unwrap()
    }

    #[test]
    fn test_exact_and_alias() {
        let router = ModelRouter::new(&config(false));
        let exact = router.resolve("claude-sonnet-4").unwrap();
        assert_eq!(exact.upstream_index, 1);
        assert_eq!(exact.actual_model, "claude-sonnet-4");

        let alias = router.resolve("fast").unwrap();
        assert_eq!(alias.upstream_index, 0);
        assert_eq!(alias.actual_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_first_upstream_wins() {
        let router = ModelRouter::new(&config(false));
        assert_eq!(router.resolve("shared").unwrap().upstream_index, 0);
    }

    #[test]
    fn test_unknown_model_without_default() {
        let router = ModelRouter::new(&config(false));
        let err = router.resolve("gpt-4").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_model_goes_to_default() {
        let router = ModelRouter::new(&config(true));
        let target = router.resolve("claude-opus-4").unwrap();
        assert_eq!(target.upstream_index, 1);
        assert_eq!(target.actual_model, "claude-opus-4");
    }

    #[test]
    fn test_model_names_sorted() {
        let router = ModelRouter::new(&config(false));
        assert_eq!(router.known_model_count(), 4);
        assert_eq!(
            router.model_names(),
            vec!["claude-sonnet-4", "fast", "gemini-2.5-pro", "shared"]
        );
    }
}
