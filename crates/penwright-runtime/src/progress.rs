//! Coarse progress reporting for a generation request.
//!
//! Progress is observational: sinks run synchronously and a panicking sink
//! is contained and logged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Milestones of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// All subtasks started
    Started,

    /// The primary provider answered
    PrimarySucceeded,

    /// The primary answer decoded into a payload
    Healed,

    /// Every subtask settled
    SubtasksJoined,
}

impl ProgressStage {
    /// Nominal completion percentage at this stage.
    pub fn percent(self) -> u8 {
        match self {
            ProgressStage::Started => 5,
            ProgressStage::PrimarySucceeded => 60,
            ProgressStage::Healed => 80,
            ProgressStage::SubtasksJoined => 100,
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressStage::Started => "started",
            ProgressStage::PrimarySucceeded => "primary_succeeded",
            ProgressStage::Healed => "healed",
            ProgressStage::SubtasksJoined => "subtasks_joined",
        };
        f.write_str(name)
    }
}

/// Receives progress updates.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, stage: ProgressStage, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressStage, u8, &str) + Send + Sync,
{
    fn on_progress(&self, stage: ProgressStage, percent: u8, message: &str) {
        self(stage, percent, message)
    }
}

/// Deliver one update, containing sink panics.
pub(crate) fn report(sink: Option<&dyn ProgressSink>, stage: ProgressStage, message: &str) {
    tracing::debug!(stage = %stage, message, "Progress");
    let Some(sink) = sink else {
        return;
    };

    let delivered = catch_unwind(AssertUnwindSafe(|| {
        sink.on_progress(stage, stage.percent(), message)
    }));
    if delivered.is_err() {
        tracing::warn!(stage = %stage, "Progress sink panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_closure_sink_receives_updates() {
        let seen = Mutex::new(Vec::new());
        let sink = |stage: ProgressStage, percent: u8, message: &str| {
            seen.lock().push((stage, percent, message.to_string()));
        };

        report(Some(&sink), ProgressStage::Healed, "strategy as_is");
        report(None, ProgressStage::Started, "ignored");

        assert_eq!(
            *seen.lock(),
            vec![(ProgressStage::Healed, 80, "strategy as_is".to_string())]
        );
    }

    #[test]
    fn test_panicking_sink_is_contained() {
        let sink = |_: ProgressStage, _: u8, _: &str| panic!("sink bug");
        report(Some(&sink), ProgressStage::Started, "go");
    }

    #[test]
    fn test_percent_increases_through_stages() {
        let stages = [
            ProgressStage::Started,
            ProgressStage::PrimarySucceeded,
            ProgressStage::Healed,
            ProgressStage::SubtasksJoined,
        ];
        assert!(stages.windows(2).all(|w| w[0].percent() < w[1].percent()));
    }
}
