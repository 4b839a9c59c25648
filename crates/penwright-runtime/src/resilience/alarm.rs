//! Cancellable one-shot timer tied to its owner's lifetime.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Holds at most one scheduled callback.
///
/// Scheduling replaces (and aborts) any pending callback. Dropping the
/// alarm aborts whatever is still pending.
#[derive(Default)]
pub struct Alarm {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    /// Create an alarm with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `delay`, cancelling any earlier schedule.
    ///
    /// Returns false when no tokio runtime is available; the owner must
    /// then apply the transition lazily.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
        true
    }

    /// Cancel the pending callback, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    /// Whether a callback is scheduled and has not yet run.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alarm")
            .field("pending", &self.is_pending())
            .finish()
    }
}
