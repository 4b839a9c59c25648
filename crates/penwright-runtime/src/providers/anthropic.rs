//! Anthropic Messages API adapter.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource, CredentialSpec},
    split_system, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// `api_key` option, falling back to `ANTHROPIC_API_KEY`.
pub const ANTHROPIC_KEY: CredentialSpec =
    CredentialSpec::new("api_key", "ANTHROPIC_API_KEY", "Anthropic API key");

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                ANTHROPIC_KEY.name,
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from adapter options with environment fallback.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ANTHROPIC_KEY.load(config)?,
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
    let (system, turns) = split_system(messages);

    let messages = turns
        .into_iter()
        .map(|msg| AnthropicMessage {
            role: msg.role,
            content: vec![ContentBlock::Text {
                text: msg.content,
                cache_control: config.prompt_caching.then_some(CacheControl {
                    type_: "ephemeral",
                }),
            }],
        })
        .collect();

    AnthropicRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system,
        messages,
        temperature: config.temperature,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let builder = http::client()
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&request);
        let response = http::send(builder, config.timeout, self.name()).await?;
        let body: AnthropicResponse = http::read_json(response).await?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
                cache_read_tokens: body.usage.cache_read_input_tokens,
                cache_creation_tokens: body.usage.cache_creation_input_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for [`AnthropicProvider`].
///
/// ## Options
/// ```json
/// {
///   "api_key": "sk-ant-...",   // optional, falls back to ANTHROPIC_API_KEY
///   "base_url": "https://..."  // optional
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ANTHROPIC_KEY.is_available(config) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_KEY.env_var
            )));
        }
        super::factory::validate_base_url(config)
    }

    fn default_model(&self) -> &'static str {
        "claude-sonnet-4-5"
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude (Messages API)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_moves_system_prompt() {
        let config = CompletionConfig {
            model: "claude-sonnet-4-5".to_string(),
            prompt_caching: true,
            ..Default::default()
        };
        let request = build_request(
            vec![ChatMessage::system("be terse"), ChatMessage::user("topic")],
            &config,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "be terse");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn test_response_shape() {
        let body: AnthropicResponse = serde_json::from_str(
            r#"{
                "content": [{"type": "text", "text": "{\"content\": \"hi\"}"}],
                "model": "claude-sonnet-4-5",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 4}
            }"#,
        )
        .unwrap();

        assert_eq!(body.content[0].text.as_deref(), Some("{\"content\": \"hi\"}"));
        assert_eq!(body.usage.cache_read_input_tokens, 0);
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let factory = AnthropicProviderFactory;
        let config = serde_json::json!({"api_key": "test-api-key", "base_url": "https://proxy.local/v1/"});

        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://proxy.local/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);

        assert_eq!(factory.create(&config).unwrap().name(), "anthropic");
        assert!(factory
            .validate_config(&serde_json::json!({"api_key": "k", "base_url": "ftp://x"}))
            .is_err());
    }

    #[tokio::test]
    async fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key));
        assert!(debug_output.contains("[REDACTED]"));

        assert!(provider.health_check().await);
        assert!(!AnthropicProvider::new("").health_check().await);
    }
}
