//! Circuit breaker implementation
//!
//! The breaker gates a fallible operation: it refuses to run it while open,
//! records every outcome with its [`Strategy`], and derives half-open from the
//! time it last opened rather than storing it.

use crate::{
    State,
    callbacks::{Callbacks, Trip},
    classifier::{Category, FailureClassifier, FailureContext, Fault},
    clock::Clock,
    errors::{CircuitError, ConfigError},
    strategy::{Strategy, StrategyKind},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of counted errors required to open the circuit
    pub error_threshold: usize,

    /// Number of successes required to close an open circuit (`SingleReset` only)
    pub recovery_threshold: usize,

    /// Seconds the circuit stays fully open before admitting trial calls
    pub recovery_timeout_secs: f64,

    /// Jitter factor for the recovery timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,

    /// Counting policy
    pub strategy: StrategyKind,

    /// Fault categories that count as errors (empty = every category)
    pub deny_list: Vec<Category>,

    /// Fault categories that never count as errors
    pub allow_list: Vec<Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            recovery_threshold: 1,
            recovery_timeout_secs: 30.0,
            jitter_factor: 0.0,
            strategy: StrategyKind::SingleReset,
            deny_list: Vec::new(),
            allow_list: Vec::new(),
        }
    }
}

impl Config {
    /// Reject settings the breaker cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.error_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("error_threshold"));
        }
        if self.recovery_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("recovery_threshold"));
        }
        if Duration::try_from_secs_f64(self.recovery_timeout_secs).is_err() {
            return Err(ConfigError::InvalidRecoveryTimeout(
                self.recovery_timeout_secs,
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        Ok(())
    }

    /// Recovery timeout as a `Duration`, saturating for unvalidated values
    pub fn recovery_timeout(&self) -> Duration {
        if self.recovery_timeout_secs.is_nan() || self.recovery_timeout_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.recovery_timeout_secs).unwrap_or(Duration::MAX)
    }
}

/// Read-only view of a circuit, independent of its result and fault types
///
/// This is what the registry stores and what lifecycle callbacks receive.
pub trait CircuitView: Send + Sync {
    fn id(&self) -> &str;

    /// Effective state at the moment of the call
    fn state(&self) -> State;

    fn error_count(&self) -> usize;

    fn success_count(&self) -> usize;

    /// Instant of the most recent transition into open
    fn open_time(&self) -> Instant;

    /// Instant after which trial calls are admitted
    ///
    /// `None` when the recovery window reaches past what the clock can
    /// represent; such a circuit stays open until an outcome closes it.
    fn recovery_start_time(&self) -> Option<Instant>;

    fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }
}

impl std::fmt::Debug for dyn CircuitView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitView")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Resolution of the jitter draw (parts per million of the recovery timeout)
const JITTER_SCALE: u64 = 1_000_000;

pub type DetectErrorFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Mutable runtime state, updated only by `call` outcomes
#[derive(Debug)]
struct Runtime {
    strategy: Strategy,
    time_opened: Instant,
    /// Recovery timeout chosen when the circuit last opened (jitter applied)
    recovery_window: Duration,
}

impl Runtime {
    fn recovery_start_time(&self) -> Option<Instant> {
        self.time_opened.checked_add(self.recovery_window)
    }

    fn state_at(&self, now: Instant) -> State {
        effective_state(self.strategy.state(), self.recovery_start_time(), now)
    }
}

/// Derive the externally visible state from the strategy's open/closed state
fn effective_state(strategy_state: State, recovery_start: Option<Instant>, now: Instant) -> State {
    if strategy_state == State::Open && recovery_start.is_some_and(|start| now >= start) {
        State::HalfOpen
    } else {
        strategy_state
    }
}

/// Circuit breaker public API
///
/// Calls through one breaker are serialised: the gate lock is held from the
/// admission check until the outcome is recorded. Accessors only take the
/// short-lived runtime lock, so they never wait on a running operation.
pub struct CircuitBreaker<T, E> {
    id: String,
    config: Config,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn FailureClassifier<E>>,
    detect_error: Option<DetectErrorFn<T>>,
    callbacks: Callbacks<T, E>,
    gate: Mutex<()>,
    runtime: Mutex<Runtime>,
}

impl<T, E> CircuitBreaker<T, E> {
    /// Create a circuit breaker from a configuration (use builder() for more options)
    pub fn new(id: impl Into<String>, config: Config) -> Result<Self, ConfigError>
    where
        E: Fault,
    {
        crate::builder::CircuitBuilder::new(id)
            .config(config)
            .build()
    }

    /// Create a new circuit breaker builder
    pub fn builder(id: impl Into<String>) -> crate::builder::CircuitBuilder<T, E> {
        crate::builder::CircuitBuilder::new(id)
    }

    /// Assemble a breaker from validated parts (used by builder)
    pub(crate) fn from_parts(
        id: String,
        config: Config,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn FailureClassifier<E>>,
        detect_error: Option<DetectErrorFn<T>>,
        callbacks: Callbacks<T, E>,
    ) -> Self {
        let strategy = Strategy::new(
            config.strategy,
            config.error_threshold,
            config.recovery_threshold,
        );
        let runtime = Runtime {
            strategy,
            time_opened: clock.now(),
            recovery_window: config.recovery_timeout(),
        };

        Self {
            id,
            config,
            clock,
            classifier,
            detect_error,
            callbacks,
            gate: Mutex::new(()),
            runtime: Mutex::new(runtime),
        }
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// While the circuit is open the operation is not invoked and
    /// [`CircuitError::Open`] is returned. Otherwise the operation's outcome
    /// is recorded and handed back unchanged: `Ok` values as-is, faults
    /// wrapped in [`CircuitError::Execution`].
    pub fn call<F>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Fault,
    {
        let _gate = self.gate.lock();

        self.admit()?;

        let start = self.clock.now();
        match operation() {
            Ok(value) => {
                let flagged = self
                    .detect_error
                    .as_ref()
                    .is_some_and(|detect| detect(&value));
                if flagged {
                    self.record_error(Trip::Detected(&value));
                } else {
                    self.record_success();
                }
                Ok(value)
            }
            Err(fault) => {
                let ctx = FailureContext {
                    circuit_id: &self.id,
                    fault: &fault,
                    category: fault.category(),
                    duration: self.clock.now().saturating_duration_since(start),
                };
                if self.classifier.should_trip(&ctx) {
                    self.record_error(Trip::Fault(&fault));
                } else {
                    tracing::trace!(
                        circuit = %self.id,
                        category = %ctx.category,
                        "fault not counted by classifier"
                    );
                }
                Err(CircuitError::Execution(fault))
            }
        }
    }

    /// Admission gate: reject while the effective state is open
    fn admit(&self) -> Result<(), CircuitError<E>> {
        let now = self.clock.now();
        let runtime = self.runtime.lock();
        if runtime.state_at(now) != State::Open {
            return Ok(());
        }

        let open_until = runtime.recovery_start_time();
        let error_count = runtime.strategy.error_count();
        tracing::debug!(
            circuit = %self.id,
            error_count,
            "circuit open, rejecting call"
        );
        Err(CircuitError::Open {
            circuit: self.id.clone(),
            open_until,
            retry_after: open_until
                .map_or(Duration::MAX, |at| at.saturating_duration_since(now)),
            error_count,
        })
    }

    fn record_error(&self, trip: Trip<'_, T, E>) {
        let opened = {
            let mut runtime = self.runtime.lock();
            let opened = runtime.strategy.handle_error();
            if opened {
                runtime.time_opened = self.clock.now();
                runtime.recovery_window = self.draw_recovery_window();
                tracing::warn!(
                    circuit = %self.id,
                    error_count = runtime.strategy.error_count(),
                    recovery_secs = runtime.recovery_window.as_secs_f64(),
                    "circuit opened"
                );
            }
            opened
        };

        if opened {
            self.callbacks.trigger_open(self, trip);
        }
    }

    fn record_success(&self) {
        let closed = self.runtime.lock().strategy.handle_success();

        if closed {
            tracing::info!(circuit = %self.id, "circuit closed");
            self.callbacks.trigger_close(self);
        }
    }

    /// Recovery timeout for a fresh trip, with jitter applied if configured
    fn draw_recovery_window(&self) -> Duration {
        let timeout = self.config.recovery_timeout();
        if self.config.jitter_factor <= 0.0 || timeout.is_zero() {
            return timeout;
        }

        // Jitter is drawn on a fixed scale and applied to the exact timeout
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: JITTER_SCALE,
            multiplier: 1.0,
            max_delay_ms: JITTER_SCALE,
        };
        let drawn = policy.calculate_delay(1, self.config.jitter_factor) as f64;
        let fraction = (drawn / JITTER_SCALE as f64).clamp(0.0, 1.0);
        Duration::try_from_secs_f64(timeout.as_secs_f64() * fraction).unwrap_or(timeout)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.config.strategy
    }

    /// Effective state, derived from the current clock reading
    pub fn state(&self) -> State {
        let now = self.clock.now();
        self.runtime.lock().state_at(now)
    }

    pub fn error_count(&self) -> usize {
        self.runtime.lock().strategy.error_count()
    }

    pub fn success_count(&self) -> usize {
        self.runtime.lock().strategy.success_count()
    }

    pub fn open_time(&self) -> Instant {
        self.runtime.lock().time_opened
    }

    pub fn recovery_start_time(&self) -> Option<Instant> {
        self.runtime.lock().recovery_start_time()
    }

    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }
}

impl<T, E> CircuitView for CircuitBreaker<T, E> {
    fn id(&self) -> &str {
        CircuitBreaker::id(self)
    }

    fn state(&self) -> State {
        CircuitBreaker::state(self)
    }

    fn error_count(&self) -> usize {
        CircuitBreaker::error_count(self)
    }

    fn success_count(&self) -> usize {
        CircuitBreaker::success_count(self)
    }

    fn open_time(&self) -> Instant {
        CircuitBreaker::open_time(self)
    }

    fn recovery_start_time(&self) -> Option<Instant> {
        CircuitBreaker::recovery_start_time(self)
    }
}

impl<T, E> std::fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("classifier", &self.classifier)
            .field("detect_error", &self.detect_error.is_some())
            .field("callbacks", &self.callbacks)
            .field("runtime", &*self.runtime.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn io_failure() -> Result<bool, io::Error> {
        Err(io::Error::other("boom"))
    }

    fn success() -> Result<bool, io::Error> {
        Ok(true)
    }

    fn manual_breaker(
        clock: &Arc<ManualClock>,
        error_threshold: usize,
        recovery_threshold: usize,
        recovery_timeout: Duration,
    ) -> CircuitBreaker<bool, io::Error> {
        CircuitBreaker::builder("test")
            .error_threshold(error_threshold)
            .recovery_threshold(recovery_threshold)
            .recovery_timeout(recovery_timeout)
            .clock(clock.clone())
            .build()
            .expect("valid config")
    }

    /// Length of the current recovery window
    fn window<T, E>(circuit: &CircuitBreaker<T, E>) -> Duration {
        circuit.recovery_start_time().expect("representable window") - circuit.open_time()
    }

    /// Breaker with threshold 1 that is half-open and needs 2 successes to close
    fn half_open_breaker(clock: &Arc<ManualClock>) -> CircuitBreaker<bool, io::Error> {
        let circuit = manual_breaker(clock, 1, 2, Duration::from_secs(1));
        let _ = circuit.call(io_failure);
        clock.advance(Duration::from_secs(1));
        assert_eq!(circuit.state(), State::HalfOpen);
        circuit
    }

    #[test]
    fn test_circuit_breaker_creation() {
        let circuit: CircuitBreaker<(), io::Error> =
            CircuitBreaker::new("test", Config::default()).expect("valid config");

        assert_eq!(circuit.id(), "test");
        assert!(circuit.is_closed());
        assert!(!circuit.is_open());
        assert_eq!(circuit.error_count(), 0);
        assert_eq!(circuit.success_count(), 0);
        assert_eq!(
            circuit.recovery_start_time(),
            Some(circuit.open_time() + Duration::from_secs(30))
        );
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            error_threshold: 0,
            ..Default::default()
        };

        let result = CircuitBreaker::<(), io::Error>::new("test", config);
        assert!(matches!(
            result,
            Err(ConfigError::ZeroThreshold("error_threshold"))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let negative = Config {
            recovery_timeout_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(
            negative.validate(),
            Err(ConfigError::InvalidRecoveryTimeout(-1.0))
        );

        let jitter = Config {
            jitter_factor: 1.5,
            ..Default::default()
        };
        assert_eq!(jitter.validate(), Err(ConfigError::InvalidJitter(1.5)));

        let recovery = Config {
            recovery_threshold: 0,
            ..Default::default()
        };
        assert_eq!(
            recovery.validate(),
            Err(ConfigError::ZeroThreshold("recovery_threshold"))
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "error_threshold": 2,
                "strategy": "NET_ERROR",
                "allow_list": ["io.not_found"]
            }"#,
        )
        .expect("valid json");

        assert_eq!(config.error_threshold, 2);
        assert_eq!(config.recovery_threshold, 1);
        assert_eq!(config.recovery_timeout_secs, 30.0);
        assert_eq!(config.strategy, StrategyKind::NetError);
        assert_eq!(config.allow_list, vec![Category::from_static("io.not_found")]);
        assert!(config.deny_list.is_empty());
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(2)
            .build()
            .expect("valid config");

        let result = circuit.call(io_failure);
        assert!(matches!(result, Err(CircuitError::Execution(_))));
        assert_eq!(circuit.state(), State::Closed);

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_open_circuit_rejects_without_invoking() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("FOO")
            .error_threshold(2)
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        let _ = circuit.call(io_failure);

        let invoked = AtomicUsize::new(0);
        let result = circuit.call(|| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        match result {
            Err(CircuitError::Open {
                circuit: id,
                open_until,
                error_count,
                ..
            }) => {
                assert_eq!(id, "FOO");
                assert_eq!(error_count, 2);
                assert_eq!(open_until, circuit.recovery_start_time());
            }
            other => panic!("Expected CircuitError::Open, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_minus_one_errors_stay_closed() {
        let clock = Arc::new(ManualClock::new());
        let circuit = manual_breaker(&clock, 4, 1, Duration::from_secs(30));

        for _ in 0..3 {
            let _ = circuit.call(io_failure);
        }
        assert_eq!(circuit.state(), State::Closed);
        assert_eq!(circuit.error_count(), 3);

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_open_until_recovery_start_then_half_open() {
        let clock = Arc::new(ManualClock::new());
        let circuit = manual_breaker(&clock, 1, 1, Duration::from_secs(10));

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.open_time(), clock.now());
        assert_eq!(
            circuit.recovery_start_time(),
            Some(clock.now() + Duration::from_secs(10))
        );

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(circuit.state(), State::Open);

        clock.advance(Duration::from_millis(1));
        assert_eq!(circuit.state(), State::HalfOpen);
        assert_eq!(circuit.state(), State::HalfOpen, "Repeated reads are stable");

        clock.advance(Duration::from_secs(60));
        assert_eq!(circuit.state(), State::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_recovery_threshold() {
        let clock = Arc::new(ManualClock::new());
        let circuit = half_open_breaker(&clock);

        assert_eq!(circuit.call(success).ok(), Some(true));
        assert_eq!(circuit.state(), State::HalfOpen);
        assert_eq!(circuit.success_count(), 1);

        let _ = circuit.call(success);
        assert_eq!(circuit.state(), State::Closed);
        assert_eq!(circuit.success_count(), 2);
    }

    #[test]
    fn test_half_open_error_reopens_and_extends_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let circuit = half_open_breaker(&clock);

        let _ = circuit.call(success);
        assert_eq!(circuit.success_count(), 1);

        clock.advance(Duration::from_millis(500));
        let _ = circuit.call(io_failure);

        assert_eq!(circuit.state(), State::Open);
        assert_eq!(circuit.error_count(), 2);
        assert_eq!(circuit.success_count(), 0);
        assert_eq!(circuit.open_time(), clock.now());

        clock.advance(Duration::from_secs(1));
        assert_eq!(circuit.state(), State::HalfOpen);

        // Success count restarted from zero, one success is not enough
        let _ = circuit.call(success);
        assert_eq!(circuit.state(), State::HalfOpen);
    }

    #[test]
    fn test_recovery_with_real_clock() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .recovery_timeout(Duration::from_millis(20))
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert!(circuit.is_open());

        std::thread::sleep(Duration::from_millis(30));
        assert!(circuit.is_half_open());

        let _ = circuit.call(success);
        assert!(circuit.is_closed());
    }

    #[test]
    fn test_detect_error_counts_return_values() {
        for (value, expected) in [(false, State::Open), (true, State::Closed)] {
            let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
                .error_threshold(1)
                .detect_error(|value: &bool| !*value)
                .build()
                .expect("valid config");

            let result = circuit.call(|| Ok(value));

            assert_eq!(result.ok(), Some(value));
            assert_eq!(circuit.state(), expected);
        }
    }

    #[test]
    fn test_allow_listed_fault_propagates_uncounted() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .allow("io")
            .build()
            .expect("valid config");

        let result = circuit.call(io_failure);

        assert!(matches!(result, Err(CircuitError::Execution(ref e)) if e.to_string() == "boom"));
        assert_eq!(circuit.state(), State::Closed);
        assert_eq!(circuit.error_count(), 0);
        assert_eq!(circuit.success_count(), 0);
    }

    #[test]
    fn test_allow_list_supports_ancestors() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .allow(Category::ANY)
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_deny_list_filters_other_faults() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .deny("io.timed_out")
            .build()
            .expect("valid config");

        let result = circuit.call(io_failure);
        assert!(result.is_err());
        assert_eq!(circuit.state(), State::Closed);

        let _ = circuit.call(|| Err(io::Error::new(io::ErrorKind::TimedOut, "slow")));
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_deny_list_supports_ancestors() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .deny(Category::ANY)
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_custom_classifier_replaces_lists() {
        use crate::classifier::PredicateClassifier;

        let classifier = Arc::new(PredicateClassifier::new(
            |ctx: &FailureContext<'_, String>| ctx.fault.contains("server"),
        ));

        let circuit: CircuitBreaker<(), String> = CircuitBreaker::builder("test")
            .error_threshold(2)
            .failure_classifier(classifier)
            .build()
            .expect("valid config");

        for _ in 0..5 {
            let _ = circuit.call(|| Err("client_error".to_string()));
        }
        assert!(circuit.is_closed(), "Circuit should not trip on filtered errors");

        let _ = circuit.call(|| Err("server_error".to_string()));
        let _ = circuit.call(|| Err("server_error".to_string()));
        assert!(circuit.is_open());
    }

    #[test]
    fn test_notifies_on_open_with_fault() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let opened_clone = opened.clone();

        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .on_open(move |circuit, trip: Trip<'_, bool, io::Error>| {
                let cause = match trip {
                    Trip::Fault(e) => e.to_string(),
                    Trip::Detected(v) => format!("value {v}"),
                };
                opened_clone
                    .lock()
                    .push((circuit.id().to_string(), circuit.state(), cause));
            })
            .build()
            .expect("valid config");

        assert!(opened.lock().is_empty());
        let _ = circuit.call(io_failure);

        let events = opened.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            ("test".to_string(), State::Open, "boom".to_string())
        );
    }

    #[test]
    fn test_notifies_on_open_with_detected_value() {
        let causes = Arc::new(Mutex::new(Vec::new()));
        let causes_clone = causes.clone();

        let circuit: CircuitBreaker<i32, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .detect_error(|code: &i32| *code >= 500)
            .on_open(move |_circuit, trip| {
                if let Trip::Detected(code) = trip {
                    causes_clone.lock().push(*code);
                }
            })
            .build()
            .expect("valid config");

        assert_eq!(circuit.call(|| Ok(503)).ok(), Some(503));
        assert_eq!(*causes.lock(), vec![503]);
    }

    #[test]
    fn test_notifies_on_close() {
        let clock = Arc::new(ManualClock::new());
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_clone = closed.clone();

        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .recovery_timeout(Duration::from_secs(1))
            .clock(clock.clone())
            .on_close(move |circuit| {
                assert_eq!(circuit.state(), State::Closed);
                closed_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("valid config");

        let _ = circuit.call(success);
        assert_eq!(closed.load(Ordering::SeqCst), 0, "Closed to closed is no transition");

        let _ = circuit.call(io_failure);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(1));
        let _ = circuit.call(success);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_net_error_strategy_tolerates_balanced_failures() {
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .strategy(StrategyKind::NetError)
            .error_threshold(3)
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Closed);
        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Closed);

        let _ = circuit.call(success);

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Closed);
        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);
    }

    #[test]
    fn test_net_error_half_open_transitions() {
        let clock = Arc::new(ManualClock::new());
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .strategy(StrategyKind::NetError)
            .error_threshold(1)
            .recovery_timeout(Duration::from_secs(1))
            .clock(clock.clone())
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);

        clock.advance(Duration::from_secs(1));
        assert_eq!(circuit.state(), State::HalfOpen);
        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);

        clock.advance(Duration::from_secs(1));
        let _ = circuit.call(success);
        let _ = circuit.call(success);
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_jitter_disabled_uses_exact_timeout() {
        let clock = Arc::new(ManualClock::new());
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .recovery_timeout(Duration::from_secs(1))
            .jitter_factor(0.0)
            .clock(clock.clone())
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(window(&circuit), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_window_within_bounds_and_fixed_per_trip() {
        let clock = Arc::new(ManualClock::new());
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("jitter_test")
            .error_threshold(1)
            .recovery_timeout(Duration::from_secs(1))
            .jitter_factor(0.25)
            .clock(clock.clone())
            .build()
            .expect("valid config");

        for _ in 0..20 {
            let _ = circuit.call(io_failure);
            let drawn = window(&circuit);
            assert!(drawn >= Duration::from_millis(749), "{drawn:?}");
            assert!(drawn <= Duration::from_secs(1), "{drawn:?}");

            // The window is chosen once, reads do not re-roll it
            assert_eq!(window(&circuit), drawn);

            clock.advance(drawn);
            assert_eq!(circuit.state(), State::HalfOpen);
        }
    }

    #[test]
    fn test_jitter_keeps_sub_millisecond_windows() {
        let clock = Arc::new(ManualClock::new());
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("fast_retry")
            .error_threshold(1)
            .recovery_timeout(Duration::from_micros(900))
            .jitter_factor(0.1)
            .clock(clock.clone())
            .build()
            .expect("valid config");

        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);

        let drawn = window(&circuit);
        assert!(drawn >= Duration::from_micros(809), "{drawn:?}");
        assert!(drawn <= Duration::from_micros(900), "{drawn:?}");

        clock.advance(Duration::from_micros(900));
        assert_eq!(circuit.state(), State::HalfOpen);
    }

    #[test]
    fn test_unrepresentable_recovery_timeout_is_rejected() {
        let result: Result<CircuitBreaker<bool, io::Error>, _> = CircuitBreaker::builder("test")
            .recovery_timeout(Duration::MAX)
            .build();

        assert!(matches!(result, Err(ConfigError::InvalidRecoveryTimeout(_))));
    }

    #[test]
    fn test_huge_recovery_timeout_stays_open() {
        let clock = Arc::new(ManualClock::new());
        let circuit: CircuitBreaker<bool, io::Error> = CircuitBreaker::builder("test")
            .error_threshold(1)
            .recovery_timeout_secs(1e19)
            .clock(clock.clone())
            .build()
            .expect("valid config");

        assert_eq!(circuit.state(), State::Closed);
        let _ = circuit.call(io_failure);
        assert_eq!(circuit.state(), State::Open);
        assert_eq!(circuit.recovery_start_time(), None);

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(circuit.state(), State::Open);
        match circuit.call(success) {
            Err(CircuitError::Open {
                open_until,
                retry_after,
                ..
            }) => {
                assert_eq!(open_until, None);
                assert_eq!(retry_after, Duration::MAX);
            }
            other => panic!("Expected CircuitError::Open, got {other:?}"),
        }
    }

    #[test]
    fn test_breaker_shared_across_threads() {
        let circuit: Arc<CircuitBreaker<bool, io::Error>> = Arc::new(
            CircuitBreaker::builder("shared")
                .error_threshold(1000)
                .build()
                .expect("valid config"),
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let circuit = circuit.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let _ = circuit.call(io_failure);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert_eq!(circuit.error_count(), 100);
        assert!(circuit.is_closed());
    }

    #[test]
    fn test_effective_state_derivation() {
        let now = Instant::now();
        let later = now + Duration::from_secs(1);

        assert_eq!(effective_state(State::Closed, Some(now), later), State::Closed);
        assert_eq!(effective_state(State::Open, Some(later), now), State::Open);
        assert_eq!(effective_state(State::Open, Some(later), later), State::HalfOpen);
        assert_eq!(effective_state(State::Open, Some(now), later), State::HalfOpen);
        assert_eq!(effective_state(State::Open, None, later), State::Open);
    }
}
