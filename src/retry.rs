//! Per-task retry policy.
//!
//! Decides, for a single download task, whether a failed attempt gets another
//! try and how long to wait first. Permanent failures (the server answered
//! with an error status) never retry; transient failures (no interpretable
//! response) retry with exponential backoff until the attempt budget is
//! spent. The backoff carries no jitter; pacing jitter is a separate
//! post-success delay applied by the worker.

use std::time::Duration;

/// Failure classification for a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The server responded with a client/server error status.
    Permanent,
    /// Transport-level failure: connection, timeout, truncated body.
    Transient,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Retry policy shared by all workers of a run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// `max_retries` is the total attempt budget per task, minimum 1
    /// (enforced by config validation).
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide the next step after attempt `attempt` (1-indexed) failed.
    ///
    /// Backoff after attempt k is `2^k` seconds, so a task retried twice
    /// waits 2s then 4s.
    pub fn decide(&self, attempt: u32, class: FailureClass) -> RetryDecision {
        match class {
            FailureClass::Permanent => RetryDecision::GiveUp,
            FailureClass::Transient if attempt >= self.max_retries => RetryDecision::GiveUp,
            FailureClass::Transient => {
                RetryDecision::RetryAfter(Duration::from_secs(2u64.saturating_pow(attempt)))
            }
        }
    }
}
