//! Bounded concurrency pool with a FIFO overflow queue.
//!
//! `running <= max_concurrent` holds at all times. When a permit is
//! released and waiters are queued, the slot is handed to the oldest waiter
//! directly, so `running` never dips in between and no later arrival can
//! overtake the queue.
//!
//! Every waiter carries its own deadline. A waiter that is not admitted in
//! time removes itself from the queue and fails with `QueueTimeout`. The
//! same happens when a waiting future is dropped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

use super::error::CallError;
use crate::config::human_duration;

/// Bulkhead configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Calls allowed to run at once
    pub max_concurrent: usize,

    /// Callers allowed to wait for a slot
    pub max_queued: usize,

    /// How long a queued caller waits before giving up
    #[serde(with = "human_duration")]
    pub queue_timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_queued: 20,
            queue_timeout: Duration::from_secs(30),
        }
    }
}

/// Occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkheadStats {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queued: usize,
}

struct Waiter {
    id: u64,
    admit: oneshot::Sender<()>,
}

struct Pool {
    running: usize,
    queue: VecDeque<Waiter>,
    next_id: u64,
}

/// Concurrency pool for one dependency.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    pool: Mutex<Pool>,
}

impl Bulkhead {
    /// Create an empty pool for `name`.
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            name: name.into(),
            config,
            pool: Mutex::new(Pool {
                running: 0,
                queue: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Current occupancy.
    pub fn stats(&self) -> BulkheadStats {
        let pool = self.pool.lock();
        BulkheadStats {
            running: pool.running,
            queued: pool.queue.len(),
            max_concurrent: self.config.max_concurrent,
            max_queued: self.config.max_queued,
        }
    }

    /// Run `work` once a slot is available.
    pub async fn run<T, Fut>(&self, work: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, CallError>>,
    {
        let _permit = self.acquire().await?;
        work.await
    }

    /// Wait for a slot.
    ///
    /// Fails with `QueueFull` before the first poll completes when the
    /// queue is already at capacity, and with `QueueTimeout` when no slot
    /// frees up within `queue_timeout`.
    pub async fn acquire(&self) -> Result<BulkheadPermit<'_>, CallError> {
        let (id, mut admitted) = {
            let mut pool = self.pool.lock();
            if pool.running < self.config.max_concurrent {
                pool.running += 1;
                return Ok(BulkheadPermit { bulkhead: self });
            }

            if pool.queue.len() >= self.config.max_queued {
                tracing::warn!(
                    dependency = %self.name,
                    queued = pool.queue.len(),
                    "Bulkhead queue full"
                );
                return Err(CallError::QueueFull {
                    dependency: self.name.clone(),
                    max_queued: self.config.max_queued,
                });
            }

            let id = pool.next_id;
            pool.next_id += 1;
            let (admit, admitted) = oneshot::channel();
            pool.queue.push_back(Waiter { id, admit });
            tracing::debug!(dependency = %self.name, queued = pool.queue.len(), "Waiting for bulkhead slot");
            (id, admitted)
        };

        let mut waiting = Waiting {
            bulkhead: self,
            id,
            settled: false,
        };

        let timeout = self.config.queue_timeout;
        let handed_over = matches!(
            tokio::time::timeout(timeout, &mut admitted).await,
            Ok(Ok(()))
        );

        // Settle under the lock while the receiver is still alive: a slot
        // may have been handed over just as the deadline fired.
        waiting.settled = true;
        let mut pool = self.pool.lock();
        let still_queued = match pool.queue.iter().position(|w| w.id == id) {
            Some(index) => {
                pool.queue.remove(index);
                true
            }
            None => false,
        };
        drop(pool);
        drop(admitted);

        if handed_over || !still_queued {
            Ok(BulkheadPermit { bulkhead: self })
        } else {
            tracing::warn!(dependency = %self.name, waited_ms = timeout.as_millis() as u64, "Bulkhead queue timeout");
            Err(CallError::QueueTimeout {
                dependency: self.name.clone(),
                waited: timeout,
            })
        }
    }

    /// Hand the slot to the oldest waiter, or free it.
    fn release(&self) {
        let mut pool = self.pool.lock();
        while let Some(waiter) = pool.queue.pop_front() {
            if waiter.admit.send(()).is_ok() {
                return;
            }
        }
        pool.running = pool.running.saturating_sub(1);
    }

    /// Undo a wait that was abandoned before it settled.
    fn abandon(&self, id: u64) {
        let mut pool = self.pool.lock();
        if let Some(index) = pool.queue.iter().position(|w| w.id == id) {
            pool.queue.remove(index);
            return;
        }
        drop(pool);
        // The slot was handed over after the waiter stopped listening.
        self.release();
    }
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A held bulkhead slot, released on drop.
#[derive(Debug)]
pub struct BulkheadPermit<'a> {
    bulkhead: &'a Bulkhead,
}

impl Drop for BulkheadPermit<'_> {
    fn drop(&mut self) {
        self.bulkhead.release();
    }
}

struct Waiting<'a> {
    bulkhead: &'a Bulkhead,
    id: u64,
    settled: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.bulkhead.abandon(self.id);
        }
    }
}
