//! Failure-counting strategies
//!
//! A strategy consumes error/success signals and decides when the underlying
//! counter model is open. It never knows about half-open: that state is
//! derived by the breaker from the time the strategy last opened.
//!
//! - `SingleReset`: separate error and success counters, each cleared when the
//!   opposite transition happens
//! - `NetError`: one running balance of errors minus successes, floored at zero

use crate::{State, errors::ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which counting policy a breaker uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Open after `error_threshold` errors, close after `recovery_threshold` successes
    #[default]
    #[serde(alias = "SINGLE_RESET", alias = "single-reset")]
    SingleReset,
    /// Open when errors outnumber successes by `error_threshold`
    #[serde(alias = "NET_ERROR", alias = "net-error")]
    NetError,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SingleReset => "single_reset",
            StrategyKind::NetError => "net_error",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_reset" => Ok(StrategyKind::SingleReset),
            "net_error" => Ok(StrategyKind::NetError),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Raw counters shared between a strategy and its state machine guards
///
/// All mutation happens under the owning breaker's state lock.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    errors: AtomicUsize,
    successes: AtomicUsize,
    net_errors: AtomicUsize,
}

impl Tally {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn clear(counter: &AtomicUsize) {
        counter.store(0, Ordering::Relaxed);
    }

    fn drop_one(counter: &AtomicUsize) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(1))
        });
    }
}

/// Strategy context - shared by every state of the machine
#[derive(Debug, Clone, Default)]
pub(crate) struct StrategyContext {
    kind: StrategyKind,
    error_threshold: usize,
    recovery_threshold: usize,
    tally: Arc<Tally>,
}

impl StrategyContext {
    fn threshold_reached(&self) -> bool {
        match self.kind {
            StrategyKind::SingleReset => Tally::get(&self.tally.errors) >= self.error_threshold,
            StrategyKind::NetError => Tally::get(&self.tally.net_errors) >= self.error_threshold,
        }
    }

    fn recovered(&self) -> bool {
        match self.kind {
            StrategyKind::SingleReset => {
                Tally::get(&self.tally.successes) >= self.recovery_threshold
            }
            StrategyKind::NetError => Tally::get(&self.tally.net_errors) < self.error_threshold,
        }
    }
}

// Open/closed lifecycle of the counter model
mod tripwire {
    use super::StrategyContext;
    use state_machines::state_machine;

    state_machine! {
        name: Tripwire,
        context: StrategyContext,
        dynamic: true,

        initial: Closed,
        states: [
            Closed,
            Open,
        ],
        events {
            trip {
                guards: [should_open],
                transition: { from: Closed, to: Open }
            }
            close {
                guards: [should_close],
                transition: { from: Open, to: Closed }
            }
        }
    }

    impl Tripwire<Closed> {
        fn should_open(&self, ctx: &StrategyContext) -> bool {
            ctx.threshold_reached()
        }
    }

    impl Tripwire<Open> {
        fn should_close(&self, ctx: &StrategyContext) -> bool {
            ctx.recovered()
        }
    }
}

use tripwire::{DynamicTripwire, TripwireEvent};

/// A breaker's counting strategy, fixed at construction
pub struct Strategy {
    context: StrategyContext,
    machine: DynamicTripwire,
}

impl Strategy {
    pub fn new(kind: StrategyKind, error_threshold: usize, recovery_threshold: usize) -> Self {
        let context = StrategyContext {
            kind,
            error_threshold,
            recovery_threshold,
            tally: Arc::new(Tally::default()),
        };
        let machine = DynamicTripwire::new(context.clone());

        Self { context, machine }
    }

    pub fn kind(&self) -> StrategyKind {
        self.context.kind
    }

    /// Record one error signal
    ///
    /// Returns `true` when this signal put the model into OPEN, either by
    /// tripping a closed model or by re-arming one that was already open (the
    /// breaker restarts its recovery window in that case).
    pub fn handle_error(&mut self) -> bool {
        let tally = &self.context.tally;
        match self.context.kind {
            StrategyKind::SingleReset => Tally::bump(&tally.errors),
            StrategyKind::NetError => Tally::bump(&tally.net_errors),
        }

        let opened = match self.state() {
            State::Closed => self.machine.handle(TripwireEvent::Trip).is_ok(),
            _ => self.context.threshold_reached(),
        };

        if opened && self.context.kind == StrategyKind::SingleReset {
            Tally::clear(&tally.successes);
        }
        opened
    }

    /// Record one success signal
    ///
    /// Returns `true` only when this signal moved the model from OPEN to CLOSED.
    pub fn handle_success(&mut self) -> bool {
        let tally = &self.context.tally;
        match self.context.kind {
            StrategyKind::SingleReset => {
                Tally::bump(&tally.successes);
                if self.context.recovered() {
                    Tally::clear(&tally.errors);
                }
            }
            StrategyKind::NetError => Tally::drop_one(&tally.net_errors),
        }

        match self.state() {
            State::Open => self.machine.handle(TripwireEvent::Close).is_ok(),
            _ => false,
        }
    }

    /// Open or closed, never half-open
    pub fn state(&self) -> State {
        match self.machine.current_state() {
            "Open" => State::Open,
            _ => State::Closed,
        }
    }

    pub fn error_count(&self) -> usize {
        let tally = &self.context.tally;
        match self.context.kind {
            StrategyKind::SingleReset => Tally::get(&tally.errors),
            StrategyKind::NetError => {
                Tally::get(&tally.net_errors).saturating_sub(self.context.error_threshold)
            }
        }
    }

    pub fn success_count(&self) -> usize {
        let tally = &self.context.tally;
        match self.context.kind {
            StrategyKind::SingleReset => Tally::get(&tally.successes),
            StrategyKind::NetError => self
                .context
                .error_threshold
                .saturating_sub(Tally::get(&tally.net_errors)),
        }
    }

    /// Running error balance (`NetError` only, zero otherwise)
    pub fn net_error_count(&self) -> usize {
        Tally::get(&self.context.tally.net_errors)
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("kind", &self.context.kind)
            .field("state", &self.state())
            .field("error_count", &self.error_count())
            .field("success_count", &self.success_count())
            .finish()
    }
}
