//! Runtime configuration loaded from YAML.
//!
//! ```yaml
//! provider:
//!   kind: groq
//!   model: llama-3.3-70b-versatile
//!   timeout: 45s
//! defaults:
//!   circuit_breaker:
//!     failure_threshold: 5
//!     open_reset_delay: 1m
//!   bulkhead:
//!     max_concurrent: 4
//! dependencies:
//!   video:
//!     rate_limiter:
//!       max_requests: 100
//!       window: 1m
//!       strategy: sliding-window
//! ```
//!
//! Durations accept humantime strings (`"30s"`, `"1m 30s"`) or integer
//! milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use penwright_core::DEFAULT_REQUIRED_FIELD;

use crate::discovery::DiscoveryConstraints;
use crate::providers::CompletionConfig;
use crate::resilience::{DependencyConfig, ResilienceRegistry};

/// Serde helper for `Duration` fields.
pub(crate) mod human_duration {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(de::Error::custom),
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Primary LLM provider selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// One of `openai`, `anthropic`, `gemini`, `openrouter`, `groq`
    pub kind: String,

    /// Model override; the provider's default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub temperature: f32,

    pub max_tokens: u32,

    /// HTTP deadline for one request
    #[serde(with = "human_duration")]
    pub timeout: Duration,

    pub prompt_caching: bool,

    /// Adapter options (`api_key`, `base_url`, ...)
    pub options: JsonValue,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
            prompt_caching: false,
            options: JsonValue::Object(Default::default()),
        }
    }
}

impl ProviderSettings {
    /// Completion settings, using `default_model` when none is configured.
    pub fn completion_config(&self, default_model: &str) -> CompletionConfig {
        CompletionConfig {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            prompt_caching: self.prompt_caching,
        }
    }
}

/// Response healing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Field a decoded payload must contain
    pub required_field: String,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            required_field: DEFAULT_REQUIRED_FIELD.to_string(),
        }
    }
}

/// Discovery cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: u64,
    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1_000,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Discovery subtasks and their adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub cache: CacheSettings,

    pub constraints: DiscoveryConstraints,

    /// Adapter name (`youtube`, `serper`) → adapter options
    pub services: BTreeMap<String, JsonValue>,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderSettings,

    pub healing: HealingConfig,

    /// Resilience settings for dependencies without their own entry
    pub defaults: DependencyConfig,

    /// Per-dependency resilience settings
    pub dependencies: BTreeMap<String, DependencyConfig>,

    pub discovery: DiscoverySettings,
}

impl RuntimeConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resilience settings that apply to `dependency`.
    pub fn dependency(&self, dependency: &str) -> &DependencyConfig {
        self.dependencies.get(dependency).unwrap_or(&self.defaults)
    }

    /// Registry with a guard for every configured dependency.
    pub fn resilience_registry(&self) -> ResilienceRegistry {
        ResilienceRegistry::with_overrides(self.defaults.clone(), self.dependencies.clone())
    }

    /// Check value ranges the types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.kind.trim().is_empty() {
            return Err(invalid("provider.kind must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(invalid("provider.temperature must be within 0.0..=2.0"));
        }
        if self.provider.max_tokens == 0 {
            return Err(invalid("provider.max_tokens must be positive"));
        }
        if self.provider.timeout.is_zero() {
            return Err(invalid("provider.timeout must be positive"));
        }
        if self.healing.required_field.trim().is_empty() {
            return Err(invalid("healing.required_field must not be empty"));
        }
        if self.discovery.cache.enabled && self.discovery.cache.capacity == 0 {
            return Err(invalid("discovery.cache.capacity must be positive"));
        }

        validate_dependency("defaults", &self.defaults)?;
        for (name, dependency) in &self.dependencies {
            validate_dependency(&format!("dependencies.{name}"), dependency)?;
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn validate_dependency(path: &str, config: &DependencyConfig) -> Result<(), ConfigError> {
    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
        return Err(invalid(format!("{path}.circuit_breaker thresholds must be positive")));
    }
    if breaker.per_call_timeout.is_zero() {
        return Err(invalid(format!("{path}.circuit_breaker.per_call_timeout must be positive")));
    }
    if !breaker.backoff_multiplier.is_finite() || breaker.backoff_multiplier < 1.0 {
        return Err(invalid(format!("{path}.circuit_breaker.backoff_multiplier must be >= 1")));
    }

    if let Some(limiter) = &config.rate_limiter {
        if limiter.max_requests == 0 || limiter.window.is_zero() {
            return Err(invalid(format!(
                "{path}.rate_limiter needs positive max_requests and window"
            )));
        }
    }

    if config.bulkhead.max_concurrent == 0 {
        return Err(invalid(format!("{path}.bulkhead.max_concurrent must be positive")));
    }
    if config.bulkhead.max_queued > 0 && config.bulkhead.queue_timeout.is_zero() {
        return Err(invalid(format!("{path}.bulkhead.queue_timeout must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::RateLimitStrategy;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.healing.required_field, "content");
        assert_eq!(config.defaults.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.defaults.bulkhead.max_queued, 20);
    }

    #[test]
    fn test_durations_accept_text_and_millis() {
        let config = RuntimeConfig::from_yaml(
            r#"
provider:
  kind: groq
  timeout: 1m 30s
defaults:
  circuit_breaker:
    per_call_timeout: 2500
    max_backoff: 10s
"#,
        )
        .unwrap();

        assert_eq!(config.provider.timeout, Duration::from_secs(90));
        assert_eq!(config.defaults.circuit_breaker.per_call_timeout, Duration::from_millis(2500));
        assert_eq!(config.defaults.circuit_breaker.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_dependency_overrides() {
        let config = RuntimeConfig::from_yaml(
            r#"
dependencies:
  video:
    rate_limiter:
      max_requests: 100
      window: 1m
      strategy: token-bucket
    bulkhead:
      max_concurrent: 2
"#,
        )
        .unwrap();

        let video = config.dependency("video");
        let limiter = video.rate_limiter.as_ref().unwrap();
        assert_eq!(limiter.strategy, RateLimitStrategy::TokenBucket);
        assert_eq!(video.bulkhead.max_concurrent, 2);
        assert_eq!(video.bulkhead.max_queued, 20);
        assert!(config.dependency("openai").rate_limiter.is_none());

        let registry = config.resilience_registry();
        assert!(registry.contains("video"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "defaults:\n  circuit_breaker:\n    failure_threshold: 0\n",
            "defaults:\n  circuit_breaker:\n    backoff_multiplier: 0.5\n",
            "defaults:\n  bulkhead:\n    max_concurrent: 0\n",
            "dependencies:\n  x:\n    rate_limiter:\n      max_requests: 0\n",
            "healing:\n  required_field: ''\n",
            "provider:\n  temperature: 3.0\n",
        ];

        for yaml in cases {
            assert!(
                matches!(RuntimeConfig::from_yaml(yaml), Err(ConfigError::Invalid(_))),
                "accepted: {yaml}"
            );
        }
    }

    #[test]
    fn test_yaml_round_trip_keeps_durations_readable() {
        let yaml = RuntimeConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("open_reset_delay: 1m"));

        let parsed = RuntimeConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, RuntimeConfig::default());
    }

    #[test]
    fn test_completion_config_uses_default_model() {
        let settings = ProviderSettings::default();
        assert_eq!(settings.completion_config("gpt-4o-mini").model, "gpt-4o-mini");

        let settings = ProviderSettings {
            model: Some("custom".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.completion_config("ignored").model, "custom");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = RuntimeConfig::from_yaml_file("/nonexistent/penwright.yaml").unwrap_err();
        assert!(error.to_string().contains("/nonexistent/penwright.yaml"));
    }
}
