pub mod validation;

use serde::{Deserialize, Serialize};

use crate::credentials::UpstreamCredential;
use crate::protocol::canonical::{ProviderKind, ThinkingConfig};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Whole-request upstream timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            base_path: String::new(),
            http_use_env_proxy: false,
        }
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServiceConfig {
    pub name: String,
    pub provider: String,
    pub base_url: String,
    /// `credential: {api_key: ...}` map form.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub credential: UpstreamCredential,
    /// Exact model names or `alias:real` pairs.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_default: bool,
    /// Upstream cannot take image content; images are stripped before encoding.
    #[serde(default)]
    pub text_only: bool,
    #[serde(default)]
    pub anthropic_version: Option<String>,
}

impl UpstreamServiceConfig {
    /// Provider family of this service. `None` only for configs that skipped validation.
    #[must_use]
    pub fn provider_kind(&self) -> Option<ProviderKind> {
        parse_provider(&self.provider)
    }
}

#[must_use]
pub fn parse_provider(name: &str) -> Option<ProviderKind> {
    match name {
        "gemini" => Some(ProviderKind::Gemini),
        "anthropic" => Some(ProviderKind::Anthropic),
        "kiro" => Some(ProviderKind::Kiro),
        _ => None,
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Applied when a request carries no `thinking` field.
    #[serde(default)]
    pub default_thinking: Option<ThinkingConfig>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_thinking: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream_services: Vec<UpstreamServiceConfig>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Same as [`load_config`], minus I/O.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}
