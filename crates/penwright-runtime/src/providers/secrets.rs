//! Credential handling for providers and discovery services.
//!
//! Keys are wrapped in [`secrecy::SecretString`] as soon as they are read
//! and only exposed at the point where a request header is set. Debug and
//! Display output never contains the value.
//!
//! ## Usage
//!
//! ```ignore
//! const KEY: CredentialSpec = CredentialSpec::new("api_key", "GROQ_API_KEY", "Groq API key");
//!
//! let credential = KEY.load(&options)?;
//! request.bearer_auth(credential.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Adapter options in the runtime configuration
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Where to look for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    /// Key in the adapter's option object
    pub config_key: &'static str,
    /// Fallback environment variable
    pub env_var: &'static str,
    /// Human-readable name for errors and logs
    pub name: &'static str,
}

impl CredentialSpec {
    pub const fn new(config_key: &'static str, env_var: &'static str, name: &'static str) -> Self {
        Self {
            config_key,
            env_var,
            name,
        }
    }

    /// Load from `options`, falling back to the environment.
    pub fn load(&self, options: &JsonValue) -> Result<ApiCredential, ProviderError> {
        ApiCredential::from_config_or_env(options, self.config_key, self.env_var, self.name)
    }

    /// Whether the credential can be loaded, without loading it.
    pub fn is_available(&self, options: &JsonValue) -> bool {
        options[self.config_key].as_str().is_some() || std::env::var(self.env_var).is_ok()
    }
}

/// A securely-stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from `config[config_key]`, falling back to `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Ok(value) = std::env::var(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Expose the value. Call only where a request header is set.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: CredentialSpec =
        CredentialSpec::new("api_key", "PENWRIGHT_TEST_UNSET_KEY_93121", "Test API key");

    #[test]
    fn test_credential_redacted() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "Test API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret));
        assert!(debug.contains("[REDACTED]"));

        let display = cred.to_string();
        assert!(!display.contains(secret));
        assert!(display.contains("Test API key from programmatic"));

        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_spec_prefers_config() {
        let options = serde_json::json!({"api_key": "config-key"});

        assert!(TEST_KEY.is_available(&options));
        let cred = TEST_KEY.load(&options).unwrap();
        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_env_fallback() {
        std::env::set_var("PENWRIGHT_TEST_FALLBACK_KEY", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "PENWRIGHT_TEST_FALLBACK_KEY",
            "Test key",
        )
        .unwrap();
        std::env::remove_var("PENWRIGHT_TEST_FALLBACK_KEY");

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_credential_names_both_sources() {
        let options = serde_json::json!({});
        assert!(!TEST_KEY.is_available(&options));

        let message = TEST_KEY.load(&options).unwrap_err().to_string();
        assert!(message.contains("Test API key"));
        assert!(message.contains("api_key"));
        assert!(message.contains("PENWRIGHT_TEST_UNSET_KEY_93121"));
    }
}
