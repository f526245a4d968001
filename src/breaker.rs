//! Run-level circuit breaker.
//!
//! Counts retry-exhausted downloads across all workers and cancels the run
//! once `threshold` of them happen with no intervening success.
//!
//! # State Machine
//!
//! ```text
//! Armed --[consecutive_failures >= threshold]--> Tripped
//! ```
//!
//! `Tripped` is terminal for the run: later successes do not re-arm the
//! breaker, and the failure counter stops moving. A trip cancels the run
//! token, which the orchestrator and every worker observe at their
//! suspension points.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Breaker state. There is no recovery state; a trip ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Armed,
    Tripped,
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    state: BreakerState,
}

/// Shared across all workers of a run via `Arc`.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cancel: CancellationToken,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// `threshold` must be positive (enforced by config validation).
    /// `cancel` is the run token; it is cancelled exactly once, on trip.
    pub fn new(threshold: u32, cancel: CancellationToken) -> Self {
        Self {
            threshold,
            cancel,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                state: BreakerState::Armed,
            }),
        }
    }

    /// Record a retry-exhausted download.
    ///
    /// Returns `true` only for the failure that trips the breaker, so the
    /// caller can append the trip note to the run metadata exactly once.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::Tripped {
            return false;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.threshold {
            inner.state = BreakerState::Tripped;
            drop(inner);
            warn!(
                threshold = self.threshold,
                "circuit breaker tripped, cancelling run"
            );
            self.cancel.cancel();
            return true;
        }
        false
    }

    /// Record a successful download. Resets the failure streak while armed;
    /// a no-op once tripped.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::Armed {
            inner.consecutive_failures = 0;
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn is_tripped(&self) -> bool {
        self.state() == BreakerState::Tripped
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
