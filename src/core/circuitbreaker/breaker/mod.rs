//!  Circuit Breaker State Machine:
//!
//!                                switch to open based on rule
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |   Probe succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!

#![allow(clippy::wrong_self_convention)]

mod policy;
pub mod stat;

pub use policy::*;
pub use stat::*;

use super::*;
use crate::{logging, utils, Error, Result};
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc, PoisonError, RwLock,
};

/// States of Circuit Breaker State Machine
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

impl From<u8> for State {
    fn from(v: u8) -> State {
        match v {
            1 => State::HalfOpen,
            2 => State::Open,
            _ => State::Closed,
        }
    }
}

/// `StateChangeListener` listens on the circuit breaker state change event
pub trait StateChangeListener: Sync + Send {
    /// on_transform_to_closed is triggered when circuit breaker state transformed to Closed.
    fn on_transform_to_closed(&self, prev: State, rule: Arc<Rule>);

    /// `on_transform_to_open` is triggered when circuit breaker state transformed to Open.
    /// The "snapshot" indicates the triggered value when the transformation occurs,
    /// it is `None` when a probe is rolled back.
    fn on_transform_to_open(&self, prev: State, rule: Arc<Rule>, snapshot: Option<f64>);

    /// `on_transform_to_half_open` is triggered when circuit breaker state transformed to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, rule: Arc<Rule>);
}

/// listeners shared by all the circuit breakers of one rule manager
pub type StateChangeListeners = Arc<RwLock<Vec<Arc<dyn StateChangeListener>>>>;

/// The outcome of an admission check on a single circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Admission {
    Pass,
    /// the caller holds the only probe of a half-open breaker,
    /// it must either complete the request or roll the probe back
    Probe,
    Block,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Block)
    }
}

/// `CircuitBreaker` guards one resource according to one rule.
pub struct CircuitBreaker {
    rule: Arc<Rule>,
    policy: TriggerPolicy,
    /// next_retry_timestamp_ms is the time circuit breaker could probe while Open.
    /// While HalfOpen it is the deadline of the probe in flight, after which the probe is granted again.
    next_retry_timestamp_ms: AtomicU64,
    state: AtomicU8,
    stat: SlidingWindowMetric,
    listeners: StateChangeListeners,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("rule", &self.rule)
            .field("state", &self.current_state())
            .field("next_retry_timestamp_ms", &self.next_retry_timestamp_ms())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(rule: Arc<Rule>, listeners: StateChangeListeners) -> Result<Self> {
        let stat = SlidingWindowMetric::new(
            rule.get_rule_stat_sliding_window_bucket_count(),
            rule.stat_interval_ms,
        )?;
        Ok(CircuitBreaker {
            policy: TriggerPolicy::from_rule(&rule),
            rule,
            next_retry_timestamp_ms: AtomicU64::new(0),
            state: AtomicU8::new(State::Closed as u8),
            stat,
            listeners,
        })
    }

    /// `bound_rule` returns the associated circuit breaking rule.
    #[inline]
    pub fn bound_rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    #[inline]
    pub fn policy(&self) -> &TriggerPolicy {
        &self.policy
    }

    /// `stat` returns the associated statistic data structure.
    #[inline]
    pub fn stat(&self) -> &SlidingWindowMetric {
        &self.stat
    }

    /// `current_state` returns current state of the circuit breaker.
    #[inline]
    pub fn current_state(&self) -> State {
        self.state.load(Ordering::SeqCst).into()
    }

    #[inline]
    pub fn next_retry_timestamp_ms(&self) -> u64 {
        self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    /// `try_pass` acquires permission of an invocation only if it is available at the time of invocation.
    pub fn try_pass(&self) -> bool {
        self.try_acquire().is_admitted()
    }

    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_with_time(utils::curr_time_millis())
    }

    /// `try_acquire_with_time` checks the state machine and records the pass or block.
    /// In Open state, only the caller winning the Open -> HalfOpen transition gets the probe.
    pub fn try_acquire_with_time(&self, now: u64) -> Admission {
        let admission = match self.current_state() {
            State::Closed => Admission::Pass,
            State::Open => {
                if self.claim_probe(now) && self.from_open_to_half_open() {
                    Admission::Probe
                } else {
                    Admission::Block
                }
            }
            // a probe never settled by a completion or a rollback is granted again after its deadline
            State::HalfOpen => {
                if self.claim_probe(now) {
                    logging::debug!(
                        "[CircuitBreaker] Probe of resource {} was not settled in time, granting a new one",
                        self.rule.resource
                    );
                    Admission::Probe
                } else {
                    Admission::Block
                }
            }
        };
        if admission.is_admitted() {
            self.stat.record_pass_with_time(now);
        } else {
            self.stat.record_block_with_time(now);
        }
        admission
    }

    /// `on_request_complete` record a completed request with the given response time as well as error (if present),
    /// and handle state transformation of the circuit breaker.
    /// `on_request_complete` is called only when a passed invocation finished.
    pub fn on_request_complete(&self, rt: u64, error: Option<&Error>) {
        self.on_request_complete_with_time(utils::curr_time_millis(), rt, error);
    }

    pub fn on_request_complete_with_time(&self, now: u64, rt: u64, error: Option<&Error>) {
        let is_slow = self.policy.is_slow(rt);
        self.stat.record_response_time_with_time(now, rt, is_slow);
        if error.is_some() {
            self.stat.record_exception_with_time(now);
        }

        match self.current_state() {
            State::Open => {}
            State::HalfOpen => {
                if self.policy.is_probe_failure(is_slow, error.is_some()) {
                    let snapshot = if is_slow { rt as f64 } else { 1.0 };
                    self.from_half_open_to_open(now, Some(snapshot));
                } else if self.from_half_open_to_closed() {
                    self.reset_metric();
                }
            }
            State::Closed => {
                let agg = self.stat.current_aggregate_with_time(now);
                if let Some(snapshot) = self.policy.evaluate(&agg) {
                    self.from_closed_to_open(now, snapshot);
                }
            }
        }
    }

    /// `rollback_probe` sends a half-open breaker back to Open,
    /// used when the probing invocation is blocked by another checker and never runs.
    pub fn rollback_probe(&self) -> bool {
        self.rollback_probe_with_time(utils::curr_time_millis())
    }

    pub fn rollback_probe_with_time(&self, now: u64) -> bool {
        self.from_half_open_to_open(now, None)
    }

    /// the underlying metric is with inner-mutability, thus, here we use `&self`
    pub fn reset_metric(&self) {
        self.stat.reset();
    }

    /// `claim_probe` moves the retry timestamp to the deadline of a new probe.
    /// Only one of the callers racing on the same timestamp succeeds.
    fn claim_probe(&self, now: u64) -> bool {
        let retry_at = self.next_retry_timestamp_ms.load(Ordering::SeqCst);
        if now < retry_at {
            return false;
        }
        self.next_retry_timestamp_ms
            .compare_exchange(
                retry_at,
                now + self.rule.recovery_timeout_ms(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    #[inline]
    fn update_next_retry_timestamp(&self, now: u64) {
        self.next_retry_timestamp_ms
            .store(now + self.rule.recovery_timeout_ms(), Ordering::SeqCst);
    }

    #[inline]
    fn compare_and_set_state(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn notify<F: Fn(&dyn StateChangeListener)>(&self, f: F) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            f(listener.as_ref());
        }
    }

    /// `from_closed_to_open` updates circuit breaker state machine from closed to open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_closed_to_open(&self, now: u64, snapshot: f64) -> bool {
        if self.current_state() != State::Closed {
            return false;
        }
        // the retry time must be visible before the Open state
        self.update_next_retry_timestamp(now);
        if !self.compare_and_set_state(State::Closed, State::Open) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] Closed -> Open, resource {}, snapshot {}",
            self.rule.resource,
            snapshot
        );
        self.notify(|l| l.on_transform_to_open(State::Closed, Arc::clone(&self.rule), Some(snapshot)));
        true
    }

    /// `from_open_to_half_open` updates circuit breaker state machine from open to half-open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_open_to_half_open(&self) -> bool {
        if !self.compare_and_set_state(State::Open, State::HalfOpen) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] Open -> HalfOpen, resource {}",
            self.rule.resource
        );
        self.notify(|l| l.on_transform_to_half_open(State::Open, Arc::clone(&self.rule)));
        true
    }

    /// `from_half_open_to_open` updates circuit breaker state machine from half-open to open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_half_open_to_open(&self, now: u64, snapshot: Option<f64>) -> bool {
        if self.current_state() != State::HalfOpen {
            return false;
        }
        self.update_next_retry_timestamp(now);
        if !self.compare_and_set_state(State::HalfOpen, State::Open) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] HalfOpen -> Open, resource {}, snapshot {:?}",
            self.rule.resource,
            snapshot
        );
        self.notify(|l| l.on_transform_to_open(State::HalfOpen, Arc::clone(&self.rule), snapshot));
        true
    }

    /// `from_half_open_to_closed` updates circuit breaker state machine from half-open to closed
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_half_open_to_closed(&self) -> bool {
        if !self.compare_and_set_state(State::HalfOpen, State::Closed) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] HalfOpen -> Closed, resource {}",
            self.rule.resource
        );
        self.notify(|l| l.on_transform_to_closed(State::HalfOpen, Arc::clone(&self.rule)));
        true
    }
}

#[cfg(test)]
pub(crate) use test::MockStateListener;
