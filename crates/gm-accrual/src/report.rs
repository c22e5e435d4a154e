//! Per-order outcomes and the per-cycle tally built from them.

use gm_schemas::OrderStatus;
use serde::{Deserialize, Serialize};

/// How one dequeued order was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// `update_status` succeeded with this status.
    Updated(OrderStatus),
    /// Authority has nothing yet (204).
    Pending,
    /// Authority throttled us; no state change.
    Throttled,
    /// No usable answer; no state change.
    TransportFailure,
    /// Authority decided but the store refused or failed the write.
    UpdateFailed,
    /// Cycle was cancelled before (or while) the order was handled.
    Skipped,
}

/// Tally of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Orders returned by `list_pending`.
    pub discovered: usize,
    /// Orders pushed onto the task queue.
    pub dispatched: usize,
    pub updated: usize,
    /// Subset of `updated` that reached `PROCESSED`.
    pub processed: usize,
    /// Subset of `updated` that reached `INVALID`.
    pub invalidated: usize,
    pub pending: usize,
    pub throttled: usize,
    pub transport_failures: usize,
    pub update_failures: usize,
    pub skipped: usize,
    /// `list_pending` failed; no workers were started.
    pub aborted: bool,
    /// The cycle token fired before the cycle finished.
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn record(&mut self, outcome: OrderOutcome) {
        match outcome {
            OrderOutcome::Updated(status) => {
                self.updated += 1;
                match status {
                    OrderStatus::Processed => self.processed += 1,
                    OrderStatus::Invalid => self.invalidated += 1,
                    OrderStatus::New | OrderStatus::Processing => {}
                }
            }
            OrderOutcome::Pending => self.pending += 1,
            OrderOutcome::Throttled => self.throttled += 1,
            OrderOutcome::TransportFailure => self.transport_failures += 1,
            OrderOutcome::UpdateFailed => self.update_failures += 1,
            OrderOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Fold one worker's per-order counts into the cycle total.
    pub fn merge(&mut self, worker: &CycleReport) {
        self.updated += worker.updated;
        self.processed += worker.processed;
        self.invalidated += worker.invalidated;
        self.pending += worker.pending;
        self.throttled += worker.throttled;
        self.transport_failures += worker.transport_failures;
        self.update_failures += worker.update_failures;
        self.skipped += worker.skipped;
    }

    /// Number of dequeued orders accounted for by an outcome.
    pub fn handled(&self) -> usize {
        self.updated
            + self.pending
            + self.throttled
            + self.transport_failures
            + self.update_failures
            + self.skipped
    }
}
