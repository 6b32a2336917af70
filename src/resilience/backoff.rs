use crate::types::PendingAction;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay after the first throttled round.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

/// Growth step for the throttling delay: zero becomes `initial_delay`, anything
/// else doubles, both capped at `max_delay`.
pub fn next_delay(current: Duration, cfg: &BackoffConfig) -> Duration {
    let grown = if current.is_zero() {
        cfg.initial_delay
    } else {
        current.saturating_mul(2)
    };
    grown.min(cfg.max_delay)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeue,
    DeadLetter,
}

#[derive(Debug, Clone)]
pub struct BackoffSnapshot {
    pub current_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive rounds that saw a throttling signal.
    pub throttled_rounds: u32,
}

#[derive(Debug, Default)]
struct State {
    current_delay: Duration,
    throttled_rounds: u32,
}

/// Retry and backoff state owned by one sender instance.
///
/// Only the flush round mutates it; snapshots may be read from any thread.
pub struct RetryController {
    max_retries_per_action: u32,
    cfg: BackoffConfig,
    state: Mutex<State>,
}

impl RetryController {
    pub fn new(max_retries_per_action: u32, cfg: BackoffConfig) -> Self {
        Self {
            max_retries_per_action,
            cfg,
            state: Mutex::new(State::default()),
        }
    }

    pub fn max_retries_per_action(&self) -> u32 {
        self.max_retries_per_action
    }

    pub fn current_delay(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current_delay
    }

    /// Apply one growth step. Returns the new delay.
    pub fn on_throttled(&self) -> Duration {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.current_delay = next_delay(st.current_delay, &self.cfg);
        st.throttled_rounds = st.throttled_rounds.saturating_add(1);
        st.current_delay
    }

    /// A round finished without any throttling signal.
    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.current_delay = Duration::ZERO;
        st.throttled_rounds = 0;
    }

    /// Count a retryable failure against the action's budget.
    pub fn record_failure<T>(&self, action: &mut PendingAction<T>) -> RetryDecision {
        action.attempts = action.attempts.saturating_add(1);
        if action.attempts > self.max_retries_per_action {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::Requeue
        }
    }

    pub fn snapshot(&self) -> BackoffSnapshot {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        BackoffSnapshot {
            current_delay_ms: st.current_delay.as_millis() as u64,
            max_delay_ms: self.cfg.max_delay.as_millis() as u64,
            throttled_rounds: st.throttled_rounds,
        }
    }
}
