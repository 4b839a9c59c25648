//! Request orchestration for article generation.
//!
//! One request fans out into the primary provider call and one subtask per
//! discovery service, all started together via `tokio::join!`, and fans in
//! exactly once after every task has settled:
//! - The primary task runs under its dependency guard (bulkhead, retry,
//!   rate limiter, circuit breaker) and its answer goes through the
//!   [`ResponseHealer`]. A primary failure fails the request.
//! - Each discovery subtask runs under its own guard. A failure or empty
//!   answer becomes a `null` entry and never fails the request.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use penwright_core::{
    ArticlePayload, Discovered, GenerationMethod, GenerationResult, ResponseHealer,
    SubtaskResults, DEFAULT_REQUIRED_FIELD,
};

use crate::cache::{CacheKey, DiscoveryCache};
use crate::config::RuntimeConfig;
use crate::discovery::{DiscoveryConstraints, DiscoveryService};
use crate::progress::{self, ProgressSink, ProgressStage};
use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};
use crate::resilience::{
    Attempted, CallError, DependencyGuard, DependencyStats, ErrorKind, ResilienceRegistry,
    RetryFailure,
};

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation failed after {attempts} attempt(s) ({kind}): {source}")]
    Failed {
        attempts: u32,
        kind: ErrorKind,
        #[source]
        source: CallError,
    },

    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("No resilience guard registered for dependency '{0}'")]
    UnknownDependency(String),

    #[error("Orchestrator not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    fn from_failure(failure: RetryFailure) -> Self {
        GenerationError::Failed {
            attempts: failure.attempts,
            kind: failure.error.kind(),
            source: failure.error,
        }
    }
}

/// One article generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// What the article is about
    pub topic: String,

    /// Discovery limits for this request; the orchestrator's when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<DiscoveryConstraints>,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            constraints: None,
        }
    }

    pub fn with_constraints(mut self, constraints: DiscoveryConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// Runs generation requests against one provider and a set of discovery
/// services.
///
/// Cheap to share: wrap it in an `Arc` and call [`generate`](Self::generate)
/// from as many tasks as needed. Concurrency per dependency is bounded by
/// its bulkhead.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    discovery: Vec<Arc<dyn DiscoveryService>>,
    registry: Arc<ResilienceRegistry>,
    healer: ResponseHealer,
    cache: Option<DiscoveryCache>,
    constraints: DiscoveryConstraints,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Generate one article.
    ///
    /// # Execution Flow
    /// 1. Start the primary task and every discovery subtask together
    /// 2. Wait for all of them to settle
    /// 3. Fail with the primary failure, or return the healed payload with
    ///    one entry per subtask (`None` for failed or empty subtasks)
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(GenerationError::EmptyTopic);
        }

        let dependency = self.provider.name();
        let guard = self
            .registry
            .get(dependency)
            .ok_or_else(|| GenerationError::UnknownDependency(dependency.to_string()))?;
        let constraints = request.constraints.as_ref().unwrap_or(&self.constraints);

        let started = Instant::now();
        tracing::info!(
            topic,
            provider = dependency,
            subtasks = self.discovery.len(),
            "Starting generation"
        );
        self.report(
            ProgressStage::Started,
            &format!("started primary and {} subtask(s)", self.discovery.len()),
        );

        // Fan-out: primary and all subtasks run concurrently
        let (primary, subtasks) = tokio::join!(
            self.run_primary(guard, topic),
            join_all(
                self.discovery
                    .iter()
                    .map(|service| self.run_subtask(service.as_ref(), topic, constraints)),
            ),
        );

        // Fan-in: exactly once, after everything settled
        let subtask_results: SubtaskResults = subtasks.into_iter().collect();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.report(
            ProgressStage::SubtasksJoined,
            &format!("{} subtask(s) joined", subtask_results.len()),
        );

        match primary {
            Ok(Attempted { value, attempts }) => {
                tracing::info!(topic, attempts, elapsed_ms, "Generation succeeded");
                Ok(GenerationResult {
                    payload: value,
                    method: GenerationMethod::Primary,
                    attempts,
                    elapsed_ms,
                    subtask_results,
                })
            }
            Err(failure) => {
                tracing::error!(
                    topic,
                    attempts = failure.attempts,
                    kind = %failure.error.kind(),
                    error = %failure.error,
                    elapsed_ms,
                    "Generation failed"
                );
                Err(GenerationError::from_failure(failure))
            }
        }
    }

    async fn run_primary(
        &self,
        guard: &DependencyGuard,
        topic: &str,
    ) -> Result<Attempted<ArticlePayload>, RetryFailure> {
        let messages = prompts::article_messages(topic, self.healer.required_field());
        let options = guard.retry_options();
        guard
            .execute(&options, || self.attempt_primary(messages.clone()))
            .await
    }

    /// One provider call followed by healing. A response that cannot be
    /// healed fails the attempt so the retry executor can ask again.
    async fn attempt_primary(&self, messages: Vec<ChatMessage>) -> Result<ArticlePayload, CallError> {
        let dependency = self.provider.name();
        let response = self
            .provider
            .complete(messages, &self.completion)
            .await
            .map_err(|e| CallError::provider(dependency, e))?;
        self.report(
            ProgressStage::PrimarySucceeded,
            &format!("{dependency} answered ({} tokens)", response.usage.total()),
        );

        let healed = self.healer.heal(&response.content);
        let strategy = healed.strategy_used;
        let value = healed.into_value().ok_or_else(|| {
            CallError::decode(format!(
                "no JSON object with '{}' in response",
                self.healer.required_field()
            ))
        })?;
        let payload = decode_payload(value, self.healer.required_field())?;

        if let Some(strategy) = strategy {
            tracing::debug!(provider = dependency, strategy = %strategy, "Healed response");
            self.report(ProgressStage::Healed, &format!("decoded via {strategy}"));
        }
        Ok(payload)
    }

    async fn run_subtask(
        &self,
        service: &dyn DiscoveryService,
        topic: &str,
        constraints: &DiscoveryConstraints,
    ) -> (String, Option<Discovered>) {
        let name = service.name();
        let key = CacheKey::new(name, topic);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(subtask = name, "Discovery cache hit");
                return (name.to_string(), Some(hit));
            }
        }

        let Some(guard) = self.registry.get(name) else {
            tracing::warn!(subtask = name, "No guard registered, skipping subtask");
            return (name.to_string(), None);
        };

        let options = guard.retry_options();
        let outcome = guard
            .execute(&options, || async move {
                service
                    .discover(topic, constraints)
                    .await
                    .map_err(|e| CallError::provider(name, e))
            })
            .await;

        match outcome {
            Ok(Attempted {
                value: Some(found),
                attempts,
            }) => {
                tracing::debug!(subtask = name, attempts, "Subtask succeeded");
                if let Some(cache) = &self.cache {
                    cache.insert(key, found.clone()).await;
                }
                (name.to_string(), Some(found))
            }
            Ok(Attempted { value: None, .. }) => {
                tracing::debug!(subtask = name, "Subtask found nothing");
                (name.to_string(), None)
            }
            Err(failure) => {
                tracing::warn!(
                    subtask = name,
                    attempts = failure.attempts,
                    kind = %failure.error.kind(),
                    error = %failure.error,
                    "Subtask failed"
                );
                (name.to_string(), None)
            }
        }
    }

    fn report(&self, stage: ProgressStage, message: &str) {
        progress::report(self.progress.as_deref(), stage, message);
    }

    /// Name of the primary provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Names of the discovery subtasks, in registration order.
    pub fn subtask_names(&self) -> Vec<&str> {
        self.discovery.iter().map(|service| service.name()).collect()
    }

    /// Guards shared by every request.
    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    /// Health of every guarded dependency.
    pub fn stats(&self) -> std::collections::BTreeMap<String, DependencyStats> {
        self.registry.stats()
    }

    /// Probe the primary provider without going through its guard.
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("subtasks", &self.subtask_names())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Decode a healed object into a payload, accepting a custom body field.
fn decode_payload(mut value: JsonValue, required_field: &str) -> Result<ArticlePayload, CallError> {
    if required_field != "content" {
        if let Some(object) = value.as_object_mut() {
            if !object.contains_key("content") {
                if let Some(body) = object.remove(required_field) {
                    object.insert("content".to_string(), body);
                }
            }
        }
    }

    serde_json::from_value(value).map_err(|e| CallError::decode(e.to_string()))
}

enum RegistrySource {
    Owned(ResilienceRegistry),
    Shared(Arc<ResilienceRegistry>),
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    completion: CompletionConfig,
    discovery: Vec<Arc<dyn DiscoveryService>>,
    registry: RegistrySource,
    healer: ResponseHealer,
    cache: Option<DiscoveryCache>,
    constraints: DiscoveryConstraints,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl OrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            provider: None,
            completion: CompletionConfig::default(),
            discovery: Vec::new(),
            registry: RegistrySource::Owned(ResilienceRegistry::default()),
            healer: ResponseHealer::new(DEFAULT_REQUIRED_FIELD),
            cache: None,
            constraints: DiscoveryConstraints::default(),
            progress: None,
        }
    }

    /// Take guards, healing, cache and discovery limits from `config`.
    ///
    /// The provider and its completion settings are set separately.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new()
            .registry(config.resilience_registry())
            .healer(ResponseHealer::new(config.healing.required_field.clone()))
            .constraints(config.discovery.constraints.clone())
            .cache(DiscoveryCache::from_settings(&config.discovery.cache))
    }

    /// Set the primary provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn completion_config(mut self, completion: CompletionConfig) -> Self {
        self.completion = completion;
        self
    }

    /// Add a discovery subtask.
    pub fn discovery(mut self, service: Arc<dyn DiscoveryService>) -> Self {
        self.discovery.push(service);
        self
    }

    /// Use `registry`, registering a guard for every dependency on build.
    pub fn registry(mut self, registry: ResilienceRegistry) -> Self {
        self.registry = RegistrySource::Owned(registry);
        self
    }

    /// Share an existing registry. It must already guard every dependency.
    pub fn shared_registry(mut self, registry: Arc<ResilienceRegistry>) -> Self {
        self.registry = RegistrySource::Shared(registry);
        self
    }

    pub fn healer(mut self, healer: ResponseHealer) -> Self {
        self.healer = healer;
        self
    }

    /// Set the discovery cache; `None` disables caching.
    pub fn cache(mut self, cache: Option<DiscoveryCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Default discovery limits for requests that carry none.
    pub fn constraints(mut self, constraints: DiscoveryConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator, GenerationError> {
        let provider = self
            .provider
            .ok_or_else(|| GenerationError::NotConfigured("No provider set".to_string()))?;

        let mut seen = BTreeSet::new();
        for service in &self.discovery {
            if !seen.insert(service.name()) {
                return Err(GenerationError::NotConfigured(format!(
                    "discovery subtask '{}' registered twice",
                    service.name()
                )));
            }
        }

        let dependencies: Vec<&str> = std::iter::once(provider.name())
            .chain(self.discovery.iter().map(|service| service.name()))
            .collect();

        let registry = match self.registry {
            RegistrySource::Owned(mut registry) => {
                for name in &dependencies {
                    registry.register(name);
                }
                Arc::new(registry)
            }
            RegistrySource::Shared(registry) => {
                if let Some(missing) = dependencies.iter().find(|name| !registry.contains(name)) {
                    return Err(GenerationError::UnknownDependency(missing.to_string()));
                }
                registry
            }
        };

        Ok(Orchestrator {
            provider,
            completion: self.completion,
            discovery: self.discovery,
            registry,
            healer: self.healer,
            cache: self.cache,
            constraints: self.constraints,
            progress: self.progress,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use penwright_core::{Reference, VideoRef, REFERENCES_SUBTASK, VIDEO_SUBTASK};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::providers::{CompletionResponse, ProviderError, TokenUsage};

    const ARTICLE: &str =
        r#"{"title": "Sourdough", "content": "<p>Flour, water, time.</p>", "tags": ["baking"]}"#;

    // Replays scripted replies in order
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, u16>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|reply| {
                            reply
                                .map(str::to_string)
                                .map_err(|status| ProviderError::from_status(status, "scripted"))
                        })
                        .collect(),
                ),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let reply = self.replies.lock().pop_front().unwrap_or_else(|| {
                Err(ProviderError::Transport {
                    message: "script exhausted".to_string(),
                    retryable: false,
                })
            });
            reply.map(|content| CompletionResponse {
                content,
                usage: TokenUsage::default(),
                model: "mock".to_string(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct StubDiscovery {
        name: &'static str,
        outcome: Result<Option<Discovered>, u16>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl StubDiscovery {
        fn new(name: &'static str, outcome: Result<Option<Discovered>, u16>) -> Self {
            Self {
                name,
                outcome,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DiscoveryService for StubDiscovery {
        fn name(&self) -> &str {
            self.name
        }

        async fn discover(
            &self,
            _topic: &str,
            _constraints: &DiscoveryConstraints,
        ) -> Result<Option<Discovered>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.outcome {
                Ok(found) => Ok(found.clone()),
                Err(status) => Err(ProviderError::from_status(*status, "stub failure")),
            }
        }
    }

    fn references() -> Discovered {
        Discovered::References(vec![Reference {
            title: "Bread".to_string(),
            url: "https://en.wikipedia.org/wiki/Bread".to_string(),
            snippet: String::new(),
            domain: "en.wikipedia.org".to_string(),
        }])
    }

    fn video() -> Discovered {
        Discovered::Video(VideoRef {
            video_id: "v1".to_string(),
            title: "Sourdough basics".to_string(),
            channel: "Bakery".to_string(),
            url: "https://www.youtube.com/watch?v=v1".to_string(),
            score: 1.0,
        })
    }

    fn orchestrator(
        provider: &Arc<ScriptedProvider>,
        services: &[&Arc<StubDiscovery>],
    ) -> OrchestratorBuilder {
        let mut builder = Orchestrator::builder().provider(provider.clone());
        for service in services {
            let service: Arc<dyn DiscoveryService> = (*service).clone();
            builder = builder.discovery(service);
        }
        builder
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_subtask_is_null_and_request_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE)]));
        let videos = Arc::new(StubDiscovery::new(VIDEO_SUBTASK, Err(400)));
        let refs = Arc::new(StubDiscovery::new(REFERENCES_SUBTASK, Ok(Some(references()))));
        let orchestrator = orchestrator(&provider, &[&videos, &refs]).build().unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Sourdough bread"))
            .await
            .unwrap();

        assert_eq!(result.payload.title, "Sourdough");
        assert_eq!(result.method, GenerationMethod::Primary);
        assert_eq!(result.attempts, 1);
        assert!(result.subtask_results.contains(VIDEO_SUBTASK));
        assert!(result.subtask_results.video().is_none());
        assert_eq!(result.subtask_results.references().map(<[_]>::len), Some(1));
        assert_eq!(videos.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_primary_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(503), Err(503), Ok(ARTICLE)]));
        let orchestrator = orchestrator(&provider, &[]).build().unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(provider.calls(), 3);
        assert!(result.subtask_results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fenced_response_is_healed() {
        let fenced = format!("```json\n{ARTICLE}\n```");
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(fenced.as_str())]));
        let orchestrator = orchestrator(&provider, &[]).build().unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap();

        assert_eq!(result.attempts, 1);
        assert_eq!(result.payload.tags, vec!["baking".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealable_response_fails_the_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("I cannot help with that."),
            Ok(ARTICLE),
        ]));
        let orchestrator = orchestrator(&provider, &[]).build().unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_failure_waits_for_subtasks() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(401)]));
        let refs = Arc::new(
            StubDiscovery::new(REFERENCES_SUBTASK, Ok(Some(references())))
                .with_delay(Duration::from_secs(10)),
        );
        let orchestrator = orchestrator(&provider, &[&refs]).build().unwrap();

        let start = Instant::now();
        let err = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Failed {
                attempts: 1,
                kind: ErrorKind::Permanent,
                ..
            }
        ));
        assert_eq!(refs.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_all_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(503); 4]));
        let orchestrator = orchestrator(&provider, &[]).build().unwrap();

        let err = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap_err();

        match err {
            GenerationError::Failed {
                attempts, kind, source,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(kind, ErrorKind::Transient);
                assert_eq!(source.status(), Some(503));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_subtasks_run_concurrently_with_primary() {
        let delay = Duration::from_secs(5);
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE)]).with_delay(delay));
        let videos = Arc::new(StubDiscovery::new(VIDEO_SUBTASK, Ok(Some(video()))).with_delay(delay));
        let refs = Arc::new(
            StubDiscovery::new(REFERENCES_SUBTASK, Ok(Some(references()))).with_delay(delay),
        );
        let orchestrator = orchestrator(&provider, &[&videos, &refs]).build().unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap();

        assert!(result.elapsed_ms >= 5_000);
        assert!(result.elapsed_ms < 6_000, "elapsed {}ms", result.elapsed_ms);
        assert_eq!(result.subtask_results.video().map(|v| v.video_id.as_str()), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_results_are_cached_per_topic() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE), Ok(ARTICLE)]));
        let refs = Arc::new(StubDiscovery::new(REFERENCES_SUBTASK, Ok(Some(references()))));
        let orchestrator = orchestrator(&provider, &[&refs])
            .cache(Some(DiscoveryCache::default()))
            .build()
            .unwrap();

        orchestrator
            .generate(&GenerationRequest::new("Sourdough bread"))
            .await
            .unwrap();
        let second = orchestrator
            .generate(&GenerationRequest::new("sourdough  BREAD"))
            .await
            .unwrap();

        assert_eq!(refs.calls(), 1);
        assert!(second.subtask_results.references().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_discovery_is_null_and_not_cached() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE), Ok(ARTICLE)]));
        let videos = Arc::new(StubDiscovery::new(VIDEO_SUBTASK, Ok(None)));
        let orchestrator = orchestrator(&provider, &[&videos])
            .cache(Some(DiscoveryCache::default()))
            .build()
            .unwrap();

        for _ in 0..2 {
            let result = orchestrator
                .generate(&GenerationRequest::new("Sourdough"))
                .await
                .unwrap();
            assert_eq!(result.subtask_results.get(VIDEO_SUBTASK), Some(&None));
        }
        assert_eq!(videos.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_milestones_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE)]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = move |stage: ProgressStage, _: u8, _: &str| sink_seen.lock().push(stage);

        let orchestrator = orchestrator(&provider, &[])
            .progress(Arc::new(sink))
            .build()
            .unwrap();
        orchestrator
            .generate(&GenerationRequest::new("Sourdough"))
            .await
            .unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ProgressStage::Started,
                ProgressStage::PrimarySucceeded,
                ProgressStage::Healed,
                ProgressStage::SubtasksJoined,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_required_field_maps_to_content() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"{"title": "Rye", "body": "<p>Dense.</p>"}"#,
        )]));
        let orchestrator = orchestrator(&provider, &[])
            .healer(ResponseHealer::new("body"))
            .build()
            .unwrap();

        let result = orchestrator
            .generate(&GenerationRequest::new("Rye"))
            .await
            .unwrap();
        assert_eq!(result.payload.content, "<p>Dense.</p>");
    }

    #[tokio::test]
    async fn test_empty_topic_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ARTICLE)]));
        let orchestrator = orchestrator(&provider, &[]).build().unwrap();

        let err = orchestrator
            .generate(&GenerationRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyTopic));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_build_requires_provider() {
        let err = Orchestrator::builder().build().unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_subtasks() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let first = Arc::new(StubDiscovery::new(VIDEO_SUBTASK, Ok(None)));
        let second = Arc::new(StubDiscovery::new(VIDEO_SUBTASK, Ok(None)));

        let err = orchestrator(&provider, &[&first, &second])
            .build()
            .unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }

    #[test]
    fn test_owned_registry_gains_guards_on_build() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let refs = Arc::new(StubDiscovery::new(REFERENCES_SUBTASK, Ok(None)));
        let orchestrator = orchestrator(&provider, &[&refs]).build().unwrap();

        let names: Vec<&str> = orchestrator.registry().names().collect();
        assert_eq!(names, vec!["mock", "references"]);
        assert_eq!(orchestrator.stats().len(), 2);
    }

    #[test]
    fn test_shared_registry_must_cover_dependencies() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let registry = Arc::new(ResilienceRegistry::default());

        let err = orchestrator(&provider, &[])
            .shared_registry(registry)
            .build()
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnknownDependency(name) if name == "mock"));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = RuntimeConfig::from_yaml(
            r#"
healing:
  required_field: body
discovery:
  cache:
    enabled: false
  constraints:
    max_results: 2
"#,
        )
        .unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));

        let orchestrator = OrchestratorBuilder::from_config(&config)
            .provider(provider)
            .build()
            .unwrap();

        assert_eq!(orchestrator.healer.required_field(), "body");
        assert_eq!(orchestrator.constraints.max_results, 2);
        assert!(orchestrator.cache.is_none());
    }
}
