//! Gateway configuration
//!
//! Layers, later wins: built-in defaults, `config/gateway.toml`,
//! `config/gateway.local.toml`, then `GATEWAY__SECTION__KEY` environment
//! variables.

use crate::admission::{BackoffConfig, RateWindowConfig};
use crate::budget::TokenBudget;
use crate::cache::MemoCacheConfig;
use crate::error::{GatewayError, Result};
use crate::orchestrator::LlmConfig;
use crate::providers::ProviderConfig;
use crate::validation::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rate_limits: RateWindowConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub budget: TokenBudget,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub estimator_cache: EstimatorCacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One configured provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Passed unchanged to the provider factory
    #[serde(default)]
    pub settings: ProviderConfig,
}

fn default_enabled() -> bool {
    true
}

impl ProviderEntry {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            settings: ProviderConfig::Null,
        }
    }
}

/// Provider lists in priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_completion_providers")]
    pub completion: Vec<ProviderEntry>,
    #[serde(default = "default_channel_providers")]
    pub channel: Vec<ProviderEntry>,
    /// Use this completion provider instead of the first enabled one
    #[serde(default)]
    pub selected_completion: Option<String>,
    /// Use this channel instead of the first enabled one
    #[serde(default)]
    pub selected_channel: Option<String>,
    /// Per-instance health check timeout (ms)
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

fn default_completion_providers() -> Vec<ProviderEntry> {
    vec![ProviderEntry::named("openai")]
}

fn default_channel_providers() -> Vec<ProviderEntry> {
    vec![ProviderEntry::named("console")]
}

fn default_health_timeout_ms() -> u64 {
    10_000
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            completion: default_completion_providers(),
            channel: default_channel_providers(),
            selected_completion: None,
            selected_channel: None,
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl ProvidersConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn completion_provider(&self) -> Result<&ProviderEntry> {
        select_provider(&self.completion, self.selected_completion.as_deref(), "completion")
    }

    pub fn channel_provider(&self) -> Result<&ProviderEntry> {
        select_provider(&self.channel, self.selected_channel.as_deref(), "channel")
    }
}

/// An explicitly named provider wins; otherwise the first enabled entry in
/// list order
pub fn select_provider<'a>(
    entries: &'a [ProviderEntry],
    selected: Option<&str>,
    family: &str,
) -> Result<&'a ProviderEntry> {
    match selected {
        Some(name) => entries
            .iter()
            .find(|entry| entry.name == name)
            .filter(|entry| entry.enabled)
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "selected {} provider '{}' is not configured or disabled",
                    family, name
                ))
            }),
        None => entries.iter().find(|entry| entry.enabled).ok_or_else(|| {
            GatewayError::Configuration(format!("no enabled {} provider configured", family))
        }),
    }
}

/// Memoization cache for token estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorCacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_size")]
    pub max_size: u64,
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_cache_size() -> u64 {
    1_000
}

impl Default for EstimatorCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_size: default_cache_size(),
        }
    }
}

impl EstimatorCacheConfig {
    pub fn to_cache_config(&self) -> MemoCacheConfig {
        MemoCacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            max_size: self.max_size,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "command_gateway=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load from files and environment, then validate
    pub fn load() -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name("config/gateway").required(false))
            .add_source(config::File::with_name("config/gateway.local").required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        self.rate_limits
            .validate()
            .map_err(|e| GatewayError::Configuration(format!("rate_limits: {}", e)))?;
        self.backoff
            .validate()
            .map_err(|e| GatewayError::Configuration(format!("backoff: {}", e)))?;
        self.budget
            .validate()
            .map_err(|e| GatewayError::Configuration(format!("budget: {}", e)))?;

        let threshold = self.validation.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(GatewayError::Configuration(format!(
                "validation.confidence_threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(GatewayError::Configuration(format!(
                "llm.temperature must be in [0, 2], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(GatewayError::Configuration(
                "llm.max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.providers.health_timeout_ms == 0 {
            return Err(GatewayError::Configuration(
                "providers.health_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.estimator_cache.max_size == 0 {
            return Err(GatewayError::Configuration(
                "estimator_cache.max_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limits.requests_per_minute, 50);
        assert_eq!(config.validation.confidence_threshold, 0.7);
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let mut config = Config::default();
        config.backoff.multiplier = 0.5;
        assert!(matches!(config.validate(), Err(GatewayError::Configuration(_))));

        let mut config = Config::default();
        config.validation.confidence_threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate_limits.requests_per_day = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("requests_per_day"));
    }

    #[test]
    fn test_first_enabled_provider_wins() {
        let mut second = ProviderEntry::named("second");
        second.enabled = true;
        let mut first = ProviderEntry::named("first");
        first.enabled = false;
        let entries = vec![first, second, ProviderEntry::named("third")];

        assert_eq!(select_provider(&entries, None, "completion").unwrap().name, "second");
        assert_eq!(select_provider(&entries, Some("third"), "completion").unwrap().name, "third");
        assert!(select_provider(&entries, Some("first"), "completion").is_err());
        assert!(select_provider(&entries, Some("missing"), "completion").is_err());
        assert!(select_provider(&[], None, "completion").is_err());
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let raw = r#"
            [rate_limits]
            requests_per_minute = 5

            [budget]
            daily_limit = 5000

            [[providers.completion]]
            name = "openai"
            settings = { model = "gpt-4o", timeout_ms = 1000 }
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.rate_limits.requests_per_minute, 5);
        assert_eq!(config.rate_limits.requests_per_hour, 1_000);
        assert_eq!(config.budget.daily_limit, 5_000);
        assert_eq!(config.providers.completion[0].settings["model"], "gpt-4o");
        assert_eq!(config.providers.channel[0].name, "console");
        assert!(config.validate().is_ok());
    }
}
