//! Local admission control limiting call volume per unit of time.
//!
//! `try_acquire` never blocks: it answers immediately and the caller decides
//! what a rejection means. Three strategies are available:
//!
//! | Strategy       | State               | Boundary behaviour                 |
//! |----------------|---------------------|------------------------------------|
//! | fixed-window   | bucket id + count   | may admit up to 2× across a border |
//! | sliding-window | timestamp log       | never more than max per window     |
//! | token-bucket   | tokens + last refill| smooth refill, bursts up to max    |

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use super::error::CallError;
use crate::config::human_duration;

/// Admission algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    FixedWindow,
    #[default]
    SlidingWindow,
    TokenBucket,
}

impl fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitStrategy::FixedWindow => write!(f, "fixed-window"),
            RateLimitStrategy::SlidingWindow => write!(f, "sliding-window"),
            RateLimitStrategy::TokenBucket => write!(f, "token-bucket"),
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Calls admitted per window
    pub max_requests: u32,

    /// Window length
    #[serde(with = "human_duration")]
    pub window: Duration,

    pub strategy: RateLimitStrategy,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            strategy: RateLimitStrategy::SlidingWindow,
        }
    }
}

#[derive(Debug)]
enum Counter {
    Fixed { bucket: i64, count: u32 },
    Sliding { log: VecDeque<i64> },
    Bucket { tokens: f64, last_refill: i64 },
}

/// Rate limiter for one dependency.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    counter: Mutex<Counter>,
}

impl RateLimiter {
    /// Create a limiter for `name` with a full allowance.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let counter = match config.strategy {
            RateLimitStrategy::FixedWindow => Counter::Fixed {
                bucket: i64::MIN,
                count: 0,
            },
            RateLimitStrategy::SlidingWindow => Counter::Sliding {
                log: VecDeque::new(),
            },
            RateLimitStrategy::TokenBucket => Counter::Bucket {
                tokens: f64::from(config.max_requests),
                last_refill: Utc::now().timestamp_millis(),
            },
        };

        Self {
            name: name.into(),
            config,
            counter: Mutex::new(counter),
        }
    }

    /// Dependency this limiter guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Admit one call now, or return false.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Utc::now().timestamp_millis())
    }

    /// Admit one call or fail with [`CallError::RateLimited`].
    pub fn check(&self) -> Result<(), CallError> {
        if self.try_acquire() {
            Ok(())
        } else {
            tracing::debug!(dependency = %self.name, "Call rejected by rate limiter");
            Err(CallError::RateLimited {
                dependency: self.name.clone(),
            })
        }
    }

    /// Calls that would be admitted right now.
    pub fn remaining(&self) -> u32 {
        self.remaining_at(Utc::now().timestamp_millis())
    }

    /// [`try_acquire`](Self::try_acquire) at an explicit epoch-millisecond instant.
    pub fn try_acquire_at(&self, now_ms: i64) -> bool {
        let max = self.config.max_requests;
        let window_ms = self.window_ms();
        let mut counter = self.counter.lock();

        match &mut *counter {
            Counter::Fixed { bucket, count } => {
                let current = now_ms.div_euclid(window_ms);
                if *bucket != current {
                    *bucket = current;
                    *count = 0;
                }
                if *count < max {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
            Counter::Sliding { log } => {
                evict(log, now_ms, window_ms);
                if (log.len() as u64) < u64::from(max) {
                    log.push_back(now_ms);
                    true
                } else {
                    false
                }
            }
            Counter::Bucket {
                tokens,
                last_refill,
            } => {
                refill(tokens, last_refill, now_ms, max, window_ms);
                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// [`remaining`](Self::remaining) at an explicit epoch-millisecond instant.
    pub fn remaining_at(&self, now_ms: i64) -> u32 {
        let max = self.config.max_requests;
        let window_ms = self.window_ms();
        let mut counter = self.counter.lock();

        match &mut *counter {
            Counter::Fixed { bucket, count } => {
                if *bucket == now_ms.div_euclid(window_ms) {
                    max.saturating_sub(*count)
                } else {
                    max
                }
            }
            Counter::Sliding { log } => {
                evict(log, now_ms, window_ms);
                max.saturating_sub(u32::try_from(log.len()).unwrap_or(u32::MAX))
            }
            Counter::Bucket {
                tokens,
                last_refill,
            } => {
                refill(tokens, last_refill, now_ms, max, window_ms);
                tokens.floor() as u32
            }
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.config.window.as_millis())
            .unwrap_or(i64::MAX)
            .max(1)
    }
}

/// Drop log entries at or before `now - window`.
fn evict(log: &mut VecDeque<i64>, now_ms: i64, window_ms: i64) {
    let horizon = now_ms.saturating_sub(window_ms);
    while log.front().is_some_and(|&at| at <= horizon) {
        log.pop_front();
    }
}

fn refill(tokens: &mut f64, last_refill: &mut i64, now_ms: i64, max: u32, window_ms: i64) {
    let elapsed = now_ms.saturating_sub(*last_refill).max(0);
    if elapsed > 0 {
        let rate = f64::from(max) / window_ms as f64;
        *tokens = (*tokens + elapsed as f64 * rate).min(f64::from(max));
        *last_refill = now_ms;
    }
}
