use std::collections::HashSet;

use super::{parse_provider, AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_services(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.connect_timeout == 0 {
        return Err(validation_err("server.connect_timeout must be greater than 0"));
    }
    let base_path = server.base_path.trim();
    if !base_path.is_empty() && !base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/' when set"));
    }
    Ok(())
}

const VALID_PROVIDERS: &[&str] = &["gemini", "anthropic", "kiro"];

fn validate_upstream_services(config: &AppConfig) -> Result<(), ConfigError> {
    if config.upstream_services.is_empty() {
        return Err(validation_err("upstream_services cannot be empty"));
    }

    let mut names = HashSet::new();
    let mut defaults = 0usize;
    for svc in &config.upstream_services {
        if svc.name.trim().is_empty() {
            return Err(validation_err("upstream service name cannot be empty"));
        }
        if !names.insert(svc.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate upstream service name '{}'",
                svc.name
            )));
        }
        validate_base_url(&svc.name, &svc.base_url)?;
        if svc.credential.secret().trim().is_empty() {
            return Err(validation_err(format!(
                "Service '{}': credential cannot be empty",
                svc.name
            )));
        }
        if parse_provider(&svc.provider).is_none() {
            return Err(validation_err(format!(
                "Service '{}': unknown provider '{}'. Must be one of: {}",
                svc.name,
                svc.provider,
                VALID_PROVIDERS.join(", ")
            )));
        }
        if svc.is_default {
            defaults += 1;
        }
    }
    if defaults > 1 {
        return Err(validation_err(
            "at most one upstream service may set is_default",
        ));
    }

    for svc in &config.upstream_services {
        if svc.models.is_empty() {
            return Err(validation_err(format!(
                "Service '{}' must have at least one model",
                svc.name
            )));
        }
    }

    let mut regular_models = HashSet::new();
    let mut all_aliases = HashSet::new();

    for svc in &config.upstream_services {
        let mut service_entries = HashSet::new();
        for model in &svc.models {
            if model.trim().is_empty() {
                return Err(validation_err(format!(
                    "Service '{}': model name cannot be empty",
                    svc.name
                )));
            }
            if !service_entries.insert(model.as_str()) {
                return Err(validation_err(format!(
                    "Service '{}': duplicate model entry '{model}'",
                    svc.name
                )));
            }
            if let Some((alias, real_model)) = model.split_once(':') {
                if alias.trim().is_empty() || real_model.trim().is_empty() {
                    return Err(validation_err(format!(
                        "Invalid alias format in '{model}'. Both parts must not be empty."
                    )));
                }
                all_aliases.insert(alias);
            } else {
                regular_models.insert(model.as_str());
            }
        }
    }

    for alias in &all_aliases {
        if regular_models.contains(alias) {
            return Err(validation_err(format!(
                "Alias name '{alias}' conflicts with a regular model name"
            )));
        }
    }

    Ok(())
}

fn validate_base_url(service_name: &str, base_url: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(base_url.trim()).map_err(|err| {
        validation_err(format!(
            "Service '{service_name}': base_url is not a valid URL: {err}"
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "Service '{service_name}': base_url must start with http:// or https://"
        )));
    }
    if parsed.query().is_some() {
        return Err(validation_err(format!(
            "Service '{service_name}': base_url must not carry a query string"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::credentials::UpstreamCredential;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            upstream_services: vec![UpstreamServiceConfig {
                name: "gemini".to_string(),
                provider: "gemini".to_string(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                credential: UpstreamCredential::ApiKey("g-test".to_string()),
                models: vec!["gemini-2.5-pro".to_string()],
                description: String::new(),
                is_default: true,
                text_only: false,
                anthropic_version: None,
            }],
            features: FeaturesConfig::default(),
        }
    }

    fn second_service(config: &AppConfig) -> UpstreamServiceConfig {
        let mut svc = config.upstream_services[0].clone();
        svc.name = "second".to_string();
        svc.provider = "anthropic".to_string();
        svc.models = vec!["claude-sonnet-4".to_string()];
        svc.is_default = false;
        svc
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_no_upstreams() {
        let mut config = make_valid_config();
        config.upstream_services.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_no_default_service() {
        let mut config = make_valid_config();
        config.upstream_services[0].is_default = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_multiple_defaults_rejected() {
        let mut config = make_valid_config();
        let mut svc2 = second_service(&config);
        svc2.is_default = true;
        config.upstream_services.push(svc2);
        let msg = validate_config(&config).unwrap_err().to_string();
        assert!(msg.contains("is_default"));
    }

    #[test]
    fn test_same_model_across_services_allowed() {
        let mut config = make_valid_config();
        let mut svc2 = second_service(&config);
        svc2.models = vec!["gemini-2.5-pro".to_string()];
        config.upstream_services.push(svc2);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_service_name() {
        let mut config = make_valid_config();
        let mut svc2 = second_service(&config);
        svc2.name = "gemini".to_string();
        config.upstream_services.push(svc2);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_model_within_same_service() {
        let mut config = make_valid_config();
        config.upstream_services[0]
            .models
            .push("gemini-2.5-pro".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_alias_conflicts_with_model() {
        let mut config = make_valid_config();
        config.upstream_services[0]
            .models
            .push("gemini-2.5-pro:gemini-2.5-flash".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_alias_with_empty_side() {
        let mut config = make_valid_config();
        config.upstream_services[0].models = vec!["fast:".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = make_valid_config();
        config.upstream_services[0].base_url = "ftp://bad.url".to_string();
        assert!(validate_config(&config).is_err());
        config.upstream_services[0].base_url = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_credential() {
        let mut config = make_valid_config();
        config.upstream_services[0].credential = UpstreamCredential::Bearer("  ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_server_settings() {
        let mut config = make_valid_config();
        config.server.http_pool_max_idle_per_host = 0;
        assert!(validate_config(&config).is_err());

        let mut config = make_valid_config();
        config.server.base_path = "api".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_no_models_is_invalid() {
        let mut config = make_valid_config();
        config.upstream_services[0].models = vec![];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = make_valid_config();
        config.upstream_services[0].provider = "openai".to_string();
        let msg = format!("{}", validate_config(&config).unwrap_err());
        assert!(msg.contains("unknown provider"));
    }

    #[test]
    fn test_valid_providers() {
        for provider in VALID_PROVIDERS {
            let mut config = make_valid_config();
            config.upstream_services[0].provider = (*provider).to_string();
            assert!(
                validate_config(&config).is_ok(),
                "Provider '{provider}' should be valid"
            );
        }
    }
}
