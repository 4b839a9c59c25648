//! Bounded retries with exponential backoff and jitter.
//!
//! # Responsibilities
//! - Re-run a unit of work until it succeeds, the retry budget is spent,
//!   or the failure is classified as not retryable
//! - Space attempts with `min(max_backoff, multiplier^attempt · 1s)` plus up
//!   to 20% jitter
//!
//! The executor knows nothing about breakers or bulkheads. Callers compose
//! it around them, so an admission rejection goes through the same
//! retry predicate as any other failure.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::CircuitBreakerConfig;
use super::error::{Attempted, CallError, RetryFailure};

/// Upper bound of the multiplicative jitter applied to each delay.
pub const DEFAULT_JITTER_CEILING: f64 = 0.2;

/// Decides whether a failure is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&CallError) -> bool + Send + Sync>;

/// Per-call retry settings.
#[derive(Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base of the exponential backoff
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay
    pub max_backoff: Duration,

    retryable: Option<RetryPredicate>,
}

impl RetryOptions {
    /// Create options using the default retry predicate.
    pub fn new(max_retries: u32, backoff_multiplier: f64, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff_multiplier,
            max_backoff,
            retryable: None,
        }
    }

    /// Options that never retry.
    pub fn no_retries() -> Self {
        Self::new(0, 1.0, Duration::ZERO)
    }

    /// Replace the default predicate ([`CallError::is_retryable`]).
    pub fn with_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Some(Arc::new(predicate));
        self
    }

    /// Whether `error` should be retried under these options.
    pub fn is_retryable(&self, error: &CallError) -> bool {
        match &self.retryable {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }
}

impl From<&CircuitBreakerConfig> for RetryOptions {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.max_retries,
            config.backoff_multiplier,
            config.max_backoff,
        )
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_backoff", &self.max_backoff)
            .field("custom_predicate", &self.retryable.is_some())
            .finish()
    }
}

/// Delay sequence for one retried call.
///
/// Delays never exceed `max_backoff` and never decrease.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    multiplier: f64,
    max_backoff: Duration,
    jitter_ceiling: f64,
    previous: Duration,
}

impl BackoffSchedule {
    /// Schedule for `options` with the given jitter ceiling.
    pub fn new(options: &RetryOptions, jitter_ceiling: f64) -> Self {
        Self {
            multiplier: options.backoff_multiplier,
            max_backoff: options.max_backoff,
            jitter_ceiling,
            previous: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), with random jitter.
    pub fn next_delay(&mut self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ceiling > 0.0 {
            rand::thread_rng().gen_range(0.0..self.jitter_ceiling)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Delay after failed attempt `attempt` with an explicit jitter fraction.
    pub fn delay_with_jitter(&mut self, attempt: u32, jitter: f64) -> Duration {
        let max_ms = self.max_backoff.as_secs_f64() * 1000.0;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = (self.multiplier.powi(exponent) * 1000.0).min(max_ms);
        let jittered_ms = (base_ms * (1.0 + jitter.max(0.0))).min(max_ms);

        let delay = Duration::try_from_secs_f64(jittered_ms.max(0.0) / 1000.0)
            .unwrap_or(self.max_backoff)
            .max(self.previous);
        self.previous = delay;
        delay
    }
}

/// Runs work with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    jitter_ceiling: f64,
}

impl RetryExecutor {
    /// Executor with the default 20% jitter ceiling.
    pub fn new() -> Self {
        Self {
            jitter_ceiling: DEFAULT_JITTER_CEILING,
        }
    }

    /// Override the jitter ceiling (0 disables jitter).
    pub fn with_jitter_ceiling(mut self, ceiling: f64) -> Self {
        self.jitter_ceiling = ceiling.max(0.0);
        self
    }

    /// Run `work` until it succeeds or retrying stops.
    ///
    /// A failure is returned immediately, without a trailing delay, when
    /// the attempt budget (`max_retries + 1`) is spent or the failure is
    /// not retryable.
    pub async fn with_retry<T, F, Fut>(
        &self,
        options: &RetryOptions,
        mut work: F,
    ) -> Result<Attempted<T>, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut schedule = BackoffSchedule::new(options, self.jitter_ceiling);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match work().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) => error,
            };

            if attempt > options.max_retries || !options.is_retryable(&error) {
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                });
            }

            let delay = schedule.next_delay(attempt);
            tracing::warn!(
                attempt,
                max_retries = options.max_retries,
                delay_ms = delay.as_millis() as u64,
                kind = %error.kind(),
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
