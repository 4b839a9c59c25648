//! Per-dependency resilience instances, built once at startup.
//!
//! The registry owns one [`DependencyGuard`] per dependency name. It is
//! constructed before any request runs and handed to the orchestrator by
//! reference; lookups borrow and never allocate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

use super::bulkhead::{Bulkhead, BulkheadConfig, BulkheadStats};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStats};
use super::error::{Attempted, CallError, RetryFailure};
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::retry::{RetryExecutor, RetryOptions};

/// Resilience settings for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    pub circuit_breaker: CircuitBreakerConfig,

    /// No limiter when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterConfig>,

    pub bulkhead: BulkheadConfig,
}

/// Health snapshot of one dependency.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyStats {
    pub circuit: CircuitStats,
    pub bulkhead: BulkheadStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
}

/// Breaker, optional limiter and bulkhead for one dependency.
#[derive(Debug)]
pub struct DependencyGuard {
    name: String,
    breaker: CircuitBreaker,
    limiter: Option<RateLimiter>,
    bulkhead: Bulkhead,
    executor: RetryExecutor,
}

impl DependencyGuard {
    /// Create the instances for `name`.
    pub fn new(name: impl Into<String>, config: &DependencyConfig) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), config.circuit_breaker.clone()),
            limiter: config
                .rate_limiter
                .clone()
                .map(|limits| RateLimiter::new(name.clone(), limits)),
            bulkhead: Bulkhead::new(name.clone(), config.bulkhead.clone()),
            executor: RetryExecutor::new(),
            name,
        }
    }

    /// Replace the retry executor (e.g. to disable jitter).
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Retry options derived from the breaker configuration.
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions::from(self.breaker.config())
    }

    /// Run `work` under the full guard stack.
    ///
    /// The bulkhead slot is taken once and held across all attempts. Each
    /// attempt then passes the rate limiter and the circuit breaker (with
    /// its per-call timeout) before `work` is polled. A bulkhead rejection
    /// is reported with zero attempts.
    pub async fn execute<T, F, Fut>(
        &self,
        options: &RetryOptions,
        work: F,
    ) -> Result<Attempted<T>, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let _slot = self
            .bulkhead
            .acquire()
            .await
            .map_err(RetryFailure::rejected)?;

        let guard = self;
        let mut work = work;
        self.executor
            .with_retry(options, move || guard.attempt(work()))
            .await
    }

    async fn attempt<T, Fut>(&self, work: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, CallError>>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.check()?;
        }
        self.breaker.call(work).await
    }

    /// Current health of this dependency.
    pub fn stats(&self) -> DependencyStats {
        DependencyStats {
            circuit: self.breaker.stats(),
            bulkhead: self.bulkhead.stats(),
            rate_limit_remaining: self.limiter.as_ref().map(RateLimiter::remaining),
        }
    }
}

/// Explicit registry of dependency guards.
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    defaults: DependencyConfig,
    overrides: BTreeMap<String, DependencyConfig>,
    guards: BTreeMap<String, DependencyGuard>,
}

impl ResilienceRegistry {
    /// Create an empty registry using `defaults` for unlisted dependencies.
    pub fn new(defaults: DependencyConfig) -> Self {
        Self {
            defaults,
            overrides: BTreeMap::new(),
            guards: BTreeMap::new(),
        }
    }

    /// Create a registry with per-dependency settings.
    ///
    /// Every overridden dependency gets its guard immediately.
    pub fn with_overrides(
        defaults: DependencyConfig,
        overrides: BTreeMap<String, DependencyConfig>,
    ) -> Self {
        let mut registry = Self {
            defaults,
            overrides,
            guards: BTreeMap::new(),
        };
        let names: Vec<String> = registry.overrides.keys().cloned().collect();
        for name in names {
            registry.register(&name);
        }
        registry
    }

    /// Ensure a guard exists for `name` and return it.
    pub fn register(&mut self, name: &str) -> &DependencyGuard {
        if !self.guards.contains_key(name) {
            let config = self.overrides.get(name).unwrap_or(&self.defaults);
            tracing::debug!(dependency = name, "Registering dependency guard");
            self.guards
                .insert(name.to_string(), DependencyGuard::new(name, config));
        }
        &self.guards[name]
    }

    /// Insert a prebuilt guard, replacing any existing one.
    pub fn insert(&mut self, guard: DependencyGuard) {
        self.guards.insert(guard.name().to_string(), guard);
    }

    /// Guard for `name`, if registered.
    pub fn get(&self, name: &str) -> Option<&DependencyGuard> {
        self.guards.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    /// Registered dependency names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.guards.keys().map(String::as_str)
    }

    /// Health of every registered dependency.
    pub fn stats(&self) -> BTreeMap<String, DependencyStats> {
        self.guards
            .iter()
            .map(|(name, guard)| (name.clone(), guard.stats()))
            .collect()
    }

    /// Close every circuit and zero its counters.
    pub fn reset_all(&self) {
        for guard in self.guards.values() {
            guard.breaker().reset();
        }
    }
}
