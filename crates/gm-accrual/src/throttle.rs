//! Rate-limit coordination.
//!
//! Not a running component: a policy applied by the worker that received a
//! `Throttled` verdict. The backoff is a sleep local to that worker and
//! cancellable by the cycle token, so the other workers keep draining the
//! queue. There is no shared rate-limit state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// What happens to a throttled order once its backoff has elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum ThrottlePolicy {
    /// The order is left untouched and picked up again by the next cycle.
    #[default]
    DeferToNextCycle,
    /// The same worker asks again after the backoff, up to `max_attempts`
    /// queries in total for this order in this cycle.
    RetryWithinCycle { max_attempts: u32 },
}

impl ThrottlePolicy {
    /// Whether a worker that has already made `attempts` queries for an order
    /// should query it again after backing off.
    pub fn should_retry(&self, attempts: u32) -> bool {
        match self {
            ThrottlePolicy::DeferToNextCycle => false,
            ThrottlePolicy::RetryWithinCycle { max_attempts } => attempts < *max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffOutcome {
    Elapsed,
    Cancelled,
}

/// Sleep for `retry_after` clamped to `max_backoff`, or until `cancel` fires.
pub async fn backoff(
    cancel: &CancellationToken,
    retry_after: Duration,
    max_backoff: Duration,
) -> BackoffOutcome {
    let delay = retry_after.min(max_backoff);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => BackoffOutcome::Cancelled,
        _ = tokio::time::sleep(delay) => BackoffOutcome::Elapsed,
    }
}
