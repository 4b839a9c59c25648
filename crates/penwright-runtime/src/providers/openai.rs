//! OpenAI-compatible chat completions adapter.
//!
//! OpenAI, OpenRouter and Groq expose the same `/chat/completions` contract
//! and differ only in base URL, credential and default model. One provider
//! type serves all three, parameterised by an [`OpenAiCompatibleFactory`].

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource, CredentialSpec},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Provider backed by an OpenAI-compatible endpoint.
pub struct OpenAiCompatibleProvider {
    name: &'static str,
    credential: ApiCredential,
    base_url: String,
    /// Extra headers, e.g. OpenRouter's attribution headers
    headers: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    /// Create a provider called `name` talking to `base_url`.
    pub fn new(name: &'static str, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name,
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "API key"),
            base_url: base_url.into(),
            headers: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn into_completion(body: ChatResponse, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
    let usage = body.usage.unwrap_or_default();
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            ..Default::default()
        },
        model: body.model.unwrap_or_else(|| requested_model.to_string()),
        stop_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            response_format: ResponseFormat {
                type_: "json_object",
            },
        };

        let mut builder = http::client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&request);
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }

        let response = http::send(builder, config.timeout, self.name).await?;
        let body: ChatResponse = http::read_json(response).await?;
        into_completion(body, &config.model)
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Factory for one OpenAI-compatible backend.
///
/// ## Options
/// ```json
/// {
///   "api_key": "...",          // optional, falls back to the backend's env var
///   "base_url": "https://...", // optional
///   "headers": {"X-Title": "penwright"}  // optional extra headers
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatibleFactory {
    kind: &'static str,
    base_url: &'static str,
    credential: CredentialSpec,
    default_model: &'static str,
    description: &'static str,
}

impl OpenAiCompatibleFactory {
    pub const OPENAI: Self = Self {
        kind: "openai",
        base_url: "https://api.openai.com/v1",
        credential: CredentialSpec::new("api_key", "OPENAI_API_KEY", "OpenAI API key"),
        default_model: "gpt-4o-mini",
        description: "OpenAI chat completions",
    };

    pub const OPENROUTER: Self = Self {
        kind: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        credential: CredentialSpec::new("api_key", "OPENROUTER_API_KEY", "OpenRouter API key"),
        default_model: "openai/gpt-4o-mini",
        description: "OpenRouter (OpenAI-compatible)",
    };

    pub const GROQ: Self = Self {
        kind: "groq",
        base_url: "https://api.groq.com/openai/v1",
        credential: CredentialSpec::new("api_key", "GROQ_API_KEY", "Groq API key"),
        default_model: "llama-3.3-70b-versatile",
        description: "Groq (OpenAI-compatible)",
    };

    fn build(&self, config: &JsonValue) -> Result<OpenAiCompatibleProvider, ProviderError> {
        const HEADER_NAMES: [&str; 2] = ["HTTP-Referer", "X-Title"];

        let headers = HEADER_NAMES
            .iter()
            .filter_map(|&name| {
                config["headers"][name]
                    .as_str()
                    .map(|value| (name, value.to_string()))
            })
            .collect();

        Ok(OpenAiCompatibleProvider {
            name: self.kind,
            credential: self.credential.load(config)?,
            base_url: config["base_url"]
                .as_str()
                .unwrap_or(self.base_url)
                .trim_end_matches('/')
                .to_string(),
            headers,
        })
    }
}

impl ProviderFactory for OpenAiCompatibleFactory {
    fn provider_type(&self) -> &'static str {
        self.kind
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(self.build(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !self.credential.is_available(config) {
            return Err(ProviderError::NotConfigured(format!(
                "{} required: set 'api_key' in config or {} env",
                self.credential.name, self.credential.env_var
            )));
        }
        super::factory::validate_base_url(config)
    }

    fn default_model(&self) -> &'static str {
        self.default_model
    }

    fn description(&self) -> &'static str {
        self.description
    }
}
