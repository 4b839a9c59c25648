//! LLM provider abstractions for penwright-runtime.
//!
//! This module defines the trait for LLM providers and the adapters for the
//! five interchangeable backends: OpenAI, Anthropic, Gemini, OpenRouter and
//! Groq. Adapters are compiled in through cargo features.
//!
//! ## Error classification
//!
//! Adapters classify failures when they happen, from the typed HTTP status,
//! and record the result in the error itself. Nothing downstream inspects
//! message text to decide whether a failure is worth retrying.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory};
#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleFactory, OpenAiCompatibleProvider};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {message}")]
    Transport { message: String, retryable: bool },

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed: {status} - {message}")]
    AuthError { status: u16, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status.
    ///
    /// 401/403 are authentication failures, 429 is a rate limit, 408 and
    /// 5xx are transient. Every other status is permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::AuthError { status, message },
            429 => ProviderError::RateLimited { retry_after: None },
            408 | 500..=599 => ProviderError::ApiError {
                status,
                message,
                retryable: true,
            },
            _ => ProviderError::ApiError {
                status,
                message,
                retryable: false,
            },
        }
    }

    /// Whether the adapter judged this failure transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { retryable, .. } => *retryable,
            ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { retryable, .. } => *retryable,
            ProviderError::ParseError(_) => true,
            ProviderError::AuthError { .. } => false,
            ProviderError::Timeout(_) => true,
            ProviderError::NotConfigured(_) => false,
        }
    }

    /// HTTP status reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::ApiError { status, .. } => Some(*status),
            ProviderError::AuthError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    #[serde(with = "crate::config::human_duration")]
    pub timeout: Duration,

    /// Enable prompt caching (Anthropic-specific)
    pub prompt_caching: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            prompt_caching: false,
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }
}

/// Split the system prompt from the conversation.
///
/// Several system messages are joined with a blank line.
pub fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system: Vec<String> = Vec::new();
    let mut others = Vec::new();

    for msg in messages {
        if msg.is_system() {
            system.push(msg.content);
        } else {
            others.push(msg);
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, others)
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,

    /// Tokens read from cache (Anthropic)
    pub cache_read_tokens: u32,

    /// Tokens written to cache (Anthropic)
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// The orchestrator guards every call with the dependency stack registered
/// under [`name`](LlmProvider::name); adapters make exactly one request per
/// `complete` call and never retry on their own.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Provider name, also the dependency name it is guarded under.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}
