//! Circuit breaker guarding one external dependency.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast with `CircuitOpen`
//! - Half-Open: probing whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      consecutive_failures >= failure_threshold
//! Open      → Half-Open: open_reset_delay elapsed (scheduled alarm)
//! Half-Open → Closed:    consecutive_successes >= success_threshold
//! Half-Open → Open:      any failure
//! ```
//!
//! One breaker exists per dependency name for the life of the process.
//! The open → half-open alarm is rescheduled on every entry into Open and
//! cancelled by `reset`, `force_state` or dropping the breaker. The same
//! transition is also applied lazily on the next admission check, so a
//! breaker used without a runtime still recovers.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

use super::alarm::Alarm;
use super::error::{Attempted, CallError, RetryFailure};
use super::retry::{RetryExecutor, RetryOptions};
use crate::config::human_duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,

    /// Deadline for a single call
    #[serde(with = "human_duration")]
    pub per_call_timeout: Duration,

    /// Time spent open before probing again
    #[serde(with = "human_duration")]
    pub open_reset_delay: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base of the exponential backoff
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff delay
    #[serde(with = "human_duration")]
    pub max_backoff: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            per_call_timeout: Duration::from_secs(60),
            open_reset_delay: Duration::from_secs(60),
            max_retries: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Failing fast
    Open,

    /// Probing recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Read-only snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub total_requests: u64,
}

/// Notification delivered to breaker observers.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitEvent {
    /// A guarded call succeeded
    Success { dependency: String },

    /// A guarded call failed
    Failure { dependency: String, error: String },

    /// The circuit changed state
    StateChange {
        dependency: String,
        from: CircuitState,
        to: CircuitState,
    },
}

type Observer = Arc<dyn Fn(&CircuitEvent) + Send + Sync>;

struct Machine {
    state: CircuitState,
    failures: u64,
    successes: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    total_requests: u64,
    opened_at: Option<Instant>,
    /// Bumped on every entry into Open, reset and forced state, so stale
    /// alarms and outcomes of calls admitted earlier are ignored.
    open_epoch: u64,
    probe_in_flight: bool,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_success_time: None,
            total_requests: 0,
            opened_at: None,
            open_epoch: 0,
            probe_in_flight: false,
        }
    }
}

struct Shared {
    name: String,
    config: CircuitBreakerConfig,
    machine: Mutex<Machine>,
    observers: RwLock<Vec<Observer>>,
}

impl Shared {
    fn transition(&self, m: &mut Machine, to: CircuitState, events: &mut Vec<CircuitEvent>) {
        let from = m.state;
        if from == to {
            return;
        }

        m.state = to;
        m.probe_in_flight = false;
        match to {
            CircuitState::Open => {
                m.opened_at = Some(Instant::now());
                m.open_epoch += 1;
                tracing::warn!(
                    dependency = %self.name,
                    consecutive_failures = m.consecutive_failures,
                    from = %from,
                    "Circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                m.opened_at = None;
                m.consecutive_successes = 0;
                tracing::info!(dependency = %self.name, "Circuit half-open, probing recovery");
            }
            CircuitState::Closed => {
                m.opened_at = None;
                tracing::info!(dependency = %self.name, from = %from, "Circuit closed");
            }
        }

        events.push(CircuitEvent::StateChange {
            dependency: self.name.clone(),
            from,
            to,
        });
    }

    /// Move Open → Half-Open once the reset delay has passed.
    fn recover_if_due(&self, m: &mut Machine, events: &mut Vec<CircuitEvent>) {
        let due = m.state == CircuitState::Open
            && m
                .opened_at
                .map(|at| at.elapsed() >= self.config.open_reset_delay)
                .unwrap_or(true);
        if due {
            self.transition(m, CircuitState::HalfOpen, events);
        }
    }

    fn on_alarm(&self, epoch: u64) {
        let mut events = Vec::new();
        {
            let mut m = self.machine.lock();
            if m.state == CircuitState::Open && m.open_epoch == epoch {
                self.transition(&mut m, CircuitState::HalfOpen, &mut events);
            }
        }
        self.emit(events);
    }

    /// Deliver events outside the state lock. Observer panics are contained.
    fn emit(&self, events: Vec<CircuitEvent>) {
        if events.is_empty() {
            return;
        }

        let observers = self.observers.read().clone();
        for event in &events {
            for observer in &observers {
                if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                    tracing::warn!(dependency = %self.name, "Circuit observer panicked");
                }
            }
        }
    }
}

/// Circuit breaker for one dependency.
pub struct CircuitBreaker {
    shared: Arc<Shared>,
    alarm: Alarm,
}

impl CircuitBreaker {
    /// Create a closed breaker for `name`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                machine: Mutex::new(Machine::new()),
                observers: RwLock::new(Vec::new()),
            }),
            alarm: Alarm::new(),
        }
    }

    /// Dependency this breaker guards.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Configuration the breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        let mut events = Vec::new();
        let state = {
            let mut m = self.shared.machine.lock();
            self.shared.recover_if_due(&mut m, &mut events);
            m.state
        };
        self.shared.emit(events);
        state
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CircuitStats {
        let state = self.state();
        let m = self.shared.machine.lock();
        CircuitStats {
            state,
            failures: m.failures,
            successes: m.successes,
            consecutive_failures: m.consecutive_failures,
            consecutive_successes: m.consecutive_successes,
            last_failure_time: m.last_failure_time,
            last_success_time: m.last_success_time,
            total_requests: m.total_requests,
        }
    }

    /// Register an observer for success, failure and state-change events.
    ///
    /// Observers run synchronously on the calling task and must be cheap.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&CircuitEvent) + Send + Sync + 'static,
    {
        self.shared.observers.write().push(Arc::new(observer));
    }

    /// Run one attempt of `work` through the breaker.
    ///
    /// Fails with `CircuitOpen` without polling `work` when the circuit is
    /// open. The attempt races the per-call timeout; expiry drops the
    /// in-flight future and counts as a failure.
    pub async fn call<T, Fut>(&self, work: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, CallError>>,
    {
        let admission = self.admit()?;
        let mut in_flight = InFlight {
            breaker: self,
            admission,
            settled: false,
        };

        let timeout = self.shared.config.per_call_timeout;
        let outcome = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout {
                dependency: self.shared.name.clone(),
                after: timeout,
            }),
        };

        in_flight.settled = true;
        match &outcome {
            Ok(_) => self.record_success(admission),
            Err(error) => self.record_failure(admission, error),
        }
        outcome
    }

    /// Run `work` through the breaker with retries.
    ///
    /// Each attempt passes through [`call`](Self::call), so every attempt is
    /// counted and a circuit that opens mid-way rejects the remaining
    /// attempts (subject to `options`' retry predicate).
    pub async fn execute<T, F, Fut>(
        &self,
        work: F,
        options: &RetryOptions,
    ) -> Result<Attempted<T>, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let breaker = self;
        let mut work = work;
        RetryExecutor::new()
            .with_retry(options, move || breaker.call(work()))
            .await
    }

    /// Force the circuit closed and zero every counter.
    pub fn reset(&self) {
        self.alarm.cancel();
        let mut events = Vec::new();
        {
            let mut m = self.shared.machine.lock();
            self.shared.transition(&mut m, CircuitState::Closed, &mut events);
            let epoch = m.open_epoch + 1;
            *m = Machine::new();
            m.open_epoch = epoch;
        }
        self.shared.emit(events);
    }

    /// Put the circuit into `state` regardless of counters.
    pub fn force_state(&self, state: CircuitState) {
        let mut events = Vec::new();
        let epoch = {
            let mut m = self.shared.machine.lock();
            self.shared.transition(&mut m, state, &mut events);
            m.consecutive_failures = 0;
            m.consecutive_successes = 0;
            m.probe_in_flight = false;
            m.open_epoch += 1;
            if state == CircuitState::Open {
                // Re-arm even when already open.
                m.opened_at = Some(Instant::now());
            }
            m.open_epoch
        };

        if state == CircuitState::Open {
            self.arm(epoch);
        } else {
            self.alarm.cancel();
        }
        self.shared.emit(events);
    }

    /// Admission check, stamping the call with the current epoch.
    fn admit(&self) -> Result<Admission, CallError> {
        let mut events = Vec::new();
        let admitted = {
            let mut m = self.shared.machine.lock();
            m.total_requests += 1;
            self.shared.recover_if_due(&mut m, &mut events);

            let probe = match m.state {
                CircuitState::Closed => Ok(false),
                CircuitState::Open => Err(()),
                CircuitState::HalfOpen if m.probe_in_flight => Err(()),
                CircuitState::HalfOpen => {
                    m.probe_in_flight = true;
                    Ok(true)
                }
            };
            probe.map(|probe| Admission {
                probe,
                epoch: m.open_epoch,
            })
        };
        self.shared.emit(events);

        admitted.map_err(|()| {
            tracing::debug!(dependency = %self.shared.name, "Call rejected, circuit open");
            CallError::CircuitOpen {
                dependency: self.shared.name.clone(),
            }
        })
    }

    fn record_success(&self, admission: Admission) {
        let mut events = vec![CircuitEvent::Success {
            dependency: self.shared.name.clone(),
        }];
        {
            let mut m = self.shared.machine.lock();
            m.successes += 1;
            m.last_success_time = Some(Utc::now());

            // Outcomes admitted before the last state change only count in totals.
            if admission.is_current(&m) {
                m.consecutive_successes += 1;
                m.consecutive_failures = 0;
                if admission.probe {
                    m.probe_in_flight = false;
                }

                if m.state == CircuitState::HalfOpen
                    && m.consecutive_successes >= self.shared.config.success_threshold
                {
                    self.shared.transition(&mut m, CircuitState::Closed, &mut events);
                }
            }
        }

        if matches!(events.last(), Some(CircuitEvent::StateChange { .. })) {
            self.alarm.cancel();
        }
        self.shared.emit(events);
    }

    fn record_failure(&self, admission: Admission, error: &CallError) {
        let mut events = vec![CircuitEvent::Failure {
            dependency: self.shared.name.clone(),
            error: error.to_string(),
        }];
        let opened = {
            let mut m = self.shared.machine.lock();
            m.failures += 1;
            m.last_failure_time = Some(Utc::now());

            let mut trip = false;
            if admission.is_current(&m) {
                m.consecutive_failures += 1;
                m.consecutive_successes = 0;
                if admission.probe {
                    m.probe_in_flight = false;
                }

                trip = match m.state {
                    CircuitState::Closed => {
                        m.consecutive_failures >= self.shared.config.failure_threshold
                    }
                    CircuitState::HalfOpen => true,
                    CircuitState::Open => false,
                };
            }

            if trip {
                self.shared.transition(&mut m, CircuitState::Open, &mut events);
                Some(m.open_epoch)
            } else {
                None
            }
        };

        if let Some(epoch) = opened {
            self.arm(epoch);
        }
        self.shared.emit(events);
    }

    fn arm(&self, epoch: u64) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.alarm.schedule(self.shared.config.open_reset_delay, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_alarm(epoch);
            }
        });
    }

    fn release_probe(&self, admission: Admission) {
        let mut m = self.shared.machine.lock();
        if admission.is_current(&m) {
            m.probe_in_flight = false;
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name)
            .field("state", &self.shared.machine.lock().state)
            .finish()
    }
}

/// A call admitted by the breaker: the epoch it was admitted in and
/// whether it holds the half-open probe slot.
#[derive(Debug, Clone, Copy)]
struct Admission {
    probe: bool,
    epoch: u64,
}

impl Admission {
    fn is_current(&self, m: &Machine) -> bool {
        self.epoch == m.open_epoch
    }
}

/// Frees the half-open probe slot if the call future is dropped mid-flight.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.admission.probe && !self.settled {
            self.breaker.release_probe(self.admission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            per_call_timeout: Duration::from_secs(5),
            open_reset_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    fn server_error() -> CallError {
        CallError::provider("test", ProviderError::from_status(500, "boom"))
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CallError> {
        cb.call(async { Err::<(), _>(server_error()) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CallError> {
        cb.call(async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_not_before() {
        let cb = CircuitBreaker::new("test", config(3, 1));

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("test", config(3, 1));

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(stats.failures, 4);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.total_requests, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_running_work() {
        let cb = CircuitBreaker::new("test", config(1, 1));
        fail(&cb).await.unwrap_err();

        let runs = AtomicU32::new(0);
        for _ in 0..5 {
            let result = cb
                .call(async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert!(matches!(result, Err(CallError::CircuitOpen { .. })));
        }

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_requests, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_moves_open_to_half_open() {
        let cb = CircuitBreaker::new("test", config(1, 1));
        fail(&cb).await.unwrap_err();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(matches!(succeed(&cb).await, Err(CallError::CircuitOpen { .. })));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_one_probe_at_a_time() {
        let cb = CircuitBreaker::new("test", config(1, 1));
        cb.force_state(CircuitState::HalfOpen);

        let probe = cb.call(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        });
        let second = async {
            tokio::task::yield_now().await;
            succeed(&cb).await
        };

        let (probe, second) = tokio::join!(probe, second);
        assert!(probe.is_ok());
        assert!(matches!(second, Err(CallError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_admitted_while_closed_cannot_free_probe_slot() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                per_call_timeout: Duration::from_secs(60),
                open_reset_delay: Duration::from_secs(10),
                ..config(1, 1)
            },
        );

        // Admitted while closed, settles at t=20s during half-open.
        let stale = cb.call(async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(())
        });
        // Opens the circuit at t=0, then probes from t=11s to t=41s.
        let probe = async {
            fail(&cb).await.unwrap_err();
            tokio::time::sleep(Duration::from_secs(11)).await;
            cb.call(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
        };
        let late = async {
            tokio::time::sleep(Duration::from_secs(21)).await;
            let state = cb.state();
            (state, succeed(&cb).await)
        };

        let (stale, probe, (state_at_21s, late)) = tokio::join!(stale, probe, late);

        assert!(stale.is_ok());
        assert_eq!(state_at_21s, CircuitState::HalfOpen);
        assert!(matches!(late, Err(CallError::CircuitOpen { .. })));
        assert!(probe.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().successes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_despite_successes() {
        let cb = CircuitBreaker::new("test", config(1, 3));
        cb.force_state(CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let cb = CircuitBreaker::new("test", config(1, 1));

        let result = cb
            .call(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CallError::Timeout { .. })));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.stats().last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_zeroes_counters_and_cancels_alarm() {
        let cb = CircuitBreaker::new("test", config(1, 1));
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.total_requests, 0);
        assert!(stats.last_failure_time.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_receive_events() {
        let cb = CircuitBreaker::new("test", config(1, 1));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        cb.subscribe(move |event| sink.lock().push(event.clone()));
        cb.subscribe(|_| panic!("observer bug"));

        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], CircuitEvent::Success { .. }));
        assert!(matches!(seen[1], CircuitEvent::Failure { .. }));
        assert_eq!(
            seen[2],
            CircuitEvent::StateChange {
                dependency: "test".to_string(),
                from: CircuitState::Closed,
                to: CircuitState::Open,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_stops_retrying_once_open() {
        let cb = CircuitBreaker::new("test", config(2, 1));
        let options = RetryOptions::from(cb.config());
        let counter = AtomicU32::new(0);
        let runs = &counter;

        let failure = cb
            .execute(
                || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(server_error())
                },
                &options,
            )
            .await
            .unwrap_err();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(failure.attempts, 3);
        assert!(matches!(failure.error, CallError::CircuitOpen { .. }));
    }

    #[test]
    fn test_lazy_recovery_without_runtime() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                open_reset_delay: Duration::ZERO,
                ..config(1, 1)
            },
        );
        cb.force_state(CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    proptest! {
        #[test]
        fn opens_exactly_at_threshold(
            threshold in 1u32..8,
            outcomes in proptest::collection::vec(any::<bool>(), 0..40),
        ) {
            let cb = CircuitBreaker::new("prop", config(threshold, 1));
            let mut consecutive = 0u32;

            for ok in outcomes {
                if ok {
                    cb.record_success(cb.admit().unwrap());
                    consecutive = 0;
                } else {
                    cb.record_failure(cb.admit().unwrap(), &server_error());
                    consecutive += 1;
                }

                if consecutive >= threshold {
                    prop_assert_eq!(cb.state(), CircuitState::Open);
                    break;
                }
                prop_assert_eq!(cb.state(), CircuitState::Closed);
            }
        }
    }
}
