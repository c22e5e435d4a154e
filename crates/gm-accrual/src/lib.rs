//! gm-accrual
//!
//! Background reconciliation of pending loyalty orders against the external
//! accrual authority.
//!
//! - [`client`]: HTTP query of the authority, classified into a [`Verdict`].
//! - [`store`]: the [`OrderStore`] port implemented by `gm-db` / `gm-testkit`.
//! - [`engine`]: one reconciliation cycle over a bounded worker pool.
//! - [`scheduler`]: periodic, non-overlapping cycles until shutdown.

pub mod client;
pub mod engine;
mod pool;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod throttle;
pub mod verdict;

pub use client::{parse_retry_after, AccrualAuthority, HttpAccrualClient};
pub use engine::{AccrualEngine, EngineConfig};
pub use report::{CycleReport, OrderOutcome};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStatus, SharedSchedulerStatus};
pub use store::OrderStore;
pub use throttle::{BackoffOutcome, ThrottlePolicy};
pub use verdict::{Settlement, TransportError, Verdict};
