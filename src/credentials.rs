//! Upstream credentials: where they come from and how they land on a request.

use std::fmt;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use http::HeaderMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::UpstreamServiceConfig;
use crate::error::AdapterError;
use crate::protocol::canonical::ProviderKind;

/// Secret used to authenticate against one upstream.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamCredential {
    ApiKey(String),
    Bearer(String),
    Cookie(String),
}

impl UpstreamCredential {
    #[must_use]
    pub fn secret(&self) -> &str {
        match self {
            UpstreamCredential::ApiKey(s)
            | UpstreamCredential::Bearer(s)
            | UpstreamCredential::Cookie(s) => s,
        }
    }

    fn kind_str(&self) -> &'static str {
        match self {
            UpstreamCredential::ApiKey(_) => "api_key",
            UpstreamCredential::Bearer(_) => "bearer",
            UpstreamCredential::Cookie(_) => "cookie",
        }
    }
}

impl fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UpstreamCredential::{}(<redacted>)", self.kind_str())
    }
}

/// Supplies the credential for a call. Account storage and rotation live behind it.
pub trait CredentialStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AdapterError::Credential`] when no usable credential exists.
    fn credential_for(&self, upstream: &str) -> Result<UpstreamCredential, AdapterError>;
}

/// Credentials read once from the config file.
#[derive(Debug, Default)]
pub struct ConfigCredentialStore {
    by_upstream: FxHashMap<String, UpstreamCredential>,
}

impl ConfigCredentialStore {
    #[must_use]
    pub fn from_services(services: &[UpstreamServiceConfig]) -> Self {
        let by_upstream = services
            .iter()
            .map(|svc| (svc.name.clone(), svc.credential.clone()))
            .collect();
        Self { by_upstream }
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn credential_for(&self, upstream: &str) -> Result<UpstreamCredential, AdapterError> {
        self.by_upstream
            .get(upstream)
            .filter(|cred| !cred.secret().trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                AdapterError::Credential(format!("no credential available for upstream '{upstream}'"))
            })
    }
}

/// Put `credential` on the outgoing headers the way `provider` expects it.
///
/// API keys use the provider's own header; bearer tokens and cookies are
/// provider-independent.
///
/// # Errors
///
/// Returns [`AdapterError::Credential`] when the secret is not a valid header value.
pub fn apply_credential(
    provider: ProviderKind,
    credential: &UpstreamCredential,
    headers: &mut HeaderMap,
) -> Result<(), AdapterError> {
    let (name, value) = match credential {
        UpstreamCredential::ApiKey(key) => {
            let name = match provider {
                ProviderKind::Gemini => HeaderName::from_static("x-goog-api-key"),
                ProviderKind::Anthropic => HeaderName::from_static("x-api-key"),
                ProviderKind::Kiro => AUTHORIZATION,
            };
            let value = if provider == ProviderKind::Kiro {
                format!("Bearer {key}")
            } else {
                key.clone()
            };
            (name, value)
        }
        UpstreamCredential::Bearer(token) => (AUTHORIZATION, format!("Bearer {token}")),
        UpstreamCredential::Cookie(cookie) => (COOKIE, cookie.clone()),
    };
    let mut value = HeaderValue::from_str(&value).map_err(|_| {
        AdapterError::Credential(format!(
            "{} credential contains characters not allowed in a header",
            credential.kind_str()
        ))
    })?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let cred = UpstreamCredential::ApiKey("sk-secret".into());
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("api_key"));
    }

    #[test]
    fn test_apply_per_provider() {
        let mut headers = HeaderMap::new();
        apply_credential(ProviderKind::Gemini, &UpstreamCredential::ApiKey("g".into()), &mut headers).unwrap();
        assert_eq!(headers["x-goog-api-key"], "g");

        let mut headers = HeaderMap::new();
        apply_credential(ProviderKind::Anthropic, &UpstreamCredential::ApiKey("a".into()), &mut headers).unwrap();
        assert_eq!(headers["x-api-key"], "a");

        let mut headers = HeaderMap::new();
        apply_credential(ProviderKind::Kiro, &UpstreamCredential::Bearer("t".into()), &mut headers).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer t");
        assert!(headers[AUTHORIZATION].is_sensitive());

        let mut headers = HeaderMap::new();
        apply_credential(ProviderKind::Kiro, &UpstreamCredential::Cookie("session=1".into()), &mut headers).unwrap();
        assert_eq!(headers[COOKIE], "session=1");
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let mut headers = HeaderMap::new();
        let err = apply_credential(
            ProviderKind::Gemini,
            &UpstreamCredential::ApiKey("bad\nkey".into()),
            &mut headers,
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Credential(_)));
    }

    #[test]
    fn test_credential_deserializes_from_single_key_map() {
        let cred: UpstreamCredential =
            serde_yaml::with::singleton_map::deserialize(serde_yaml::Deserializer::from_str(
                "bearer: tok",
            ))
            .unwrap();
        assert_eq!(cred, UpstreamCredential::Bearer("tok".into()));

        let cfg = crate::config::parse_config(
            r#"
upstream_services:
  - name: k
    provider: kiro
    base_url: https://kiro.example.com
    credential:
      cookie: "session=1"
    models: [m]
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.upstream_services[0].credential,
            UpstreamCredential::Cookie("session=1".into())
        );
    }
}
