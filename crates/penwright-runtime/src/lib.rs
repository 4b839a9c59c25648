//! # penwright-runtime
//!
//! Resilient execution and orchestration for Penwright.
//!
//! This crate turns a topic into a generated article by calling an LLM
//! provider and a set of discovery services concurrently, each behind its
//! own guard stack:
//! - [`resilience`]: circuit breaker, rate limiter, bulkhead and retry
//!   executor, composed per dependency by a [`DependencyGuard`]
//! - [`providers`]: OpenAI, Anthropic, Gemini, OpenRouter and Groq adapters
//!   behind the [`LlmProvider`] trait (cargo features)
//! - [`discovery`]: video and reference lookups behind [`DiscoveryService`]
//! - [`orchestrator`]: fan-out, healing and the single fan-in
//!
//! ## Example
//!
//! ```rust,ignore
//! use penwright_runtime::{GenerationRequest, Orchestrator, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("penwright.yaml")?;
//! let providers = ProviderRegistry::with_defaults();
//! let provider = providers.create(&config.provider.kind, &config.provider.options)?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .provider(provider)
//!     .build()?;
//!
//! let result = orchestrator.generate(&GenerationRequest::new("sourdough starters")).await?;
//! println!("{}", result.payload.title);
//! ```

pub mod cache;
pub mod config;
pub mod discovery;
#[cfg(any(
    feature = "anthropic",
    feature = "openai",
    feature = "gemini",
    feature = "discovery"
))]
mod http;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use cache::{CacheKey, DiscoveryCache};
pub use config::{
    CacheSettings, ConfigError, DiscoverySettings, HealingConfig, ProviderSettings, RuntimeConfig,
};
pub use discovery::{DiscoveryConstraints, DiscoveryService};
pub use orchestrator::{GenerationError, GenerationRequest, Orchestrator, OrchestratorBuilder};
pub use progress::{ProgressSink, ProgressStage};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use resilience::{
    Attempted, Bulkhead, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    DependencyConfig, DependencyGuard, ErrorKind, RateLimiter, RateLimiterConfig,
    ResilienceRegistry, RetryExecutor, RetryFailure, RetryOptions,
};
