//! Resilience patterns for penwright-runtime.
//!
//! This module provides:
//! - Circuit breaker to stop calling a failing dependency
//! - Rate limiter for local admission control
//! - Bulkhead to bound concurrency per dependency
//! - Retry with exponential backoff and jitter
//! - A registry holding one guard stack per dependency

mod alarm;
mod bulkhead;
mod circuit_breaker;
mod error;
mod rate_limiter;
mod registry;
mod retry;

pub use alarm::Alarm;
pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadPermit, BulkheadStats};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitEvent, CircuitState, CircuitStats,
};
pub use error::{Attempted, CallError, ErrorKind, RetryFailure};
pub use rate_limiter::{RateLimitStrategy, RateLimiter, RateLimiterConfig};
pub use registry::{DependencyConfig, DependencyGuard, DependencyStats, ResilienceRegistry};
pub use retry::{BackoffSchedule, RetryExecutor, RetryOptions, RetryPredicate, DEFAULT_JITTER_CEILING};
