//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::{Callbacks, Trip},
    circuit::{CircuitBreaker, CircuitView, Config, DetectErrorFn},
    classifier::{Category, FailureClassifier, Fault, ListClassifier},
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
    strategy::StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder<T, E> {
    id: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    failure_classifier: Option<Arc<dyn FailureClassifier<E>>>,
    detect_error: Option<DetectErrorFn<T>>,
    callbacks: Callbacks<T, E>,
}

impl<T, E> CircuitBuilder<T, E> {
    /// Create a new builder for a circuit with the given identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: Config::default(),
            clock: None,
            failure_classifier: None,
            detect_error: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Create a builder whose circuit gets a random (UUID v4) identifier
    pub fn with_generated_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the number of counted errors that opens the circuit
    pub fn error_threshold(mut self, threshold: usize) -> Self {
        self.config.error_threshold = threshold;
        self
    }

    /// Set the successes needed to close an open circuit (`SingleReset` only)
    pub fn recovery_threshold(mut self, threshold: usize) -> Self {
        self.config.recovery_threshold = threshold;
        self
    }

    /// Set how long the circuit stays fully open
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Set the recovery timeout in seconds
    pub fn recovery_timeout_secs(mut self, seconds: f64) -> Self {
        self.config.recovery_timeout_secs = seconds;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Select the counting strategy
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Count only faults in this category (or below it)
    ///
    /// May be called repeatedly; with no deny entries every fault counts.
    pub fn deny(mut self, category: impl Into<Category>) -> Self {
        self.config.deny_list.push(category.into());
        self
    }

    /// Never count faults in this category (or below it)
    pub fn allow(mut self, category: impl Into<Category>) -> Self {
        self.config.allow_list.push(category.into());
        self
    }

    pub fn deny_list<I, C>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Category>,
    {
        self.config
            .deny_list
            .extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn allow_list<I, C>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Category>,
    {
        self.config
            .allow_list
            .extend(categories.into_iter().map(Into::into));
        self
    }

    /// Set a failure classifier, replacing the allow/deny lists
    ///
    /// # Examples
    ///
    /// ```rust
    /// use breakerbox::{CircuitBreaker, FailureContext, PredicateClassifier};
    /// use std::sync::Arc;
    ///
    /// let circuit: CircuitBreaker<(), String> = CircuitBreaker::builder("api")
    ///     .failure_classifier(Arc::new(PredicateClassifier::new(
    ///         |ctx: &FailureContext<'_, String>| ctx.duration.as_secs_f64() > 1.0,
    ///     )))
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn failure_classifier(mut self, classifier: Arc<dyn FailureClassifier<E>>) -> Self {
        self.failure_classifier = Some(classifier);
        self
    }

    /// Treat return values matching `detect` as errors
    pub fn detect_error<F>(mut self, detect: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.detect_error = Some(Arc::new(detect));
        self
    }

    /// Set a custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CircuitView, Trip<'_, T, E>) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CircuitView) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker<T, E>, ConfigError>
    where
        E: Fault,
    {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));
        let classifier = self.failure_classifier.unwrap_or_else(|| {
            Arc::new(ListClassifier::new(
                self.config.deny_list.clone(),
                self.config.allow_list.clone(),
            ))
        });

        Ok(CircuitBreaker::from_parts(
            self.id,
            self.config,
            clock,
            classifier,
            self.detect_error,
            self.callbacks,
        ))
    }
}

impl<T, E> std::fmt::Debug for CircuitBuilder<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("failure_classifier", &self.failure_classifier)
            .field("detect_error", &self.detect_error.is_some())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
