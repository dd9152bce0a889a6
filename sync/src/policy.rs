//! Retry policies.
//!
//! Before each drain the engine asks its [`RetryPolicy`] whether to attempt
//! the remote at all, given how many drains in a row have failed. The default,
//! [`AlwaysRetry`], re-attempts on every trigger.

use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive drain failures for one namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    pub consecutive: u32,
    pub last_failure: Option<Instant>,
}

impl FailureState {
    pub fn record_failure(&mut self, at: Instant) {
        self.consecutive = self.consecutive.saturating_add(1);
        self.last_failure = Some(at);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Decides whether a drain may contact the remote.
pub trait RetryPolicy: Send + Sync + Debug {
    fn should_attempt(&self, state: &FailureState, now: Instant) -> bool;
}

/// Retry on every trigger, without limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn should_attempt(&self, _state: &FailureState, _now: Instant) -> bool {
        true
    }
}

/// Wait `initial * 2^(n-1)` after the n-th consecutive failure, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay required after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(failures - 1);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_attempt(&self, state: &FailureState, now: Instant) -> bool {
        match state.last_failure {
            Some(at) => now.saturating_duration_since(at) >= self.delay(state.consecutive),
            None => true,
        }
    }
}
