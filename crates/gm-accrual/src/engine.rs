//! Accrual engine: configuration plus the per-cycle dispatcher.
//!
//! One cycle = list pending orders, start the worker pool, stream the
//! orders into the bounded task queue, close it, wait for every worker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use gm_schemas::Order;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::AccrualAuthority;
use crate::pool::{spawn_workers, WorkerContext};
use crate::report::CycleReport;
use crate::store::OrderStore;
use crate::throttle::ThrottlePolicy;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pool size `W`.
    pub workers: usize,
    pub poll_interval: Duration,
    /// Budget for one authority query.
    pub request_timeout: Duration,
    /// Task queue bound; the dispatcher blocks when it is full.
    pub queue_capacity: usize,
    pub throttle_policy: ThrottlePolicy,
    /// Upper bound on a single throttle backoff.
    pub max_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_capacity: DEFAULT_WORKERS,
            throttle_policy: ThrottlePolicy::DeferToNextCycle,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("engine config: workers must be positive");
        }
        if self.queue_capacity == 0 {
            bail!("engine config: queue_capacity must be positive");
        }
        if self.poll_interval.is_zero() {
            bail!("engine config: poll_interval must be positive");
        }
        if self.request_timeout.is_zero() {
            bail!("engine config: request_timeout must be positive");
        }
        if let ThrottlePolicy::RetryWithinCycle { max_attempts: 0 } = self.throttle_policy {
            bail!("engine config: throttle max_attempts must be positive");
        }
        Ok(())
    }
}

/// Reconciles pending orders against the accrual authority.
pub struct AccrualEngine {
    store: Arc<dyn OrderStore>,
    authority: Arc<dyn AccrualAuthority>,
    config: EngineConfig,
}

impl AccrualEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        authority: Arc<dyn AccrualAuthority>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            authority,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one reconciliation cycle under `cancel` and return its tally.
    ///
    /// Never fails: a store read error ends the cycle early with
    /// `aborted = true`; everything else is counted per order.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let started = std::time::Instant::now();
        let mut report = CycleReport::default();

        let orders = match self.store.list_pending().await {
            Ok(orders) => orders,
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to get pending orders");
                report.aborted = true;
                report.elapsed_ms = elapsed_ms(started);
                return report;
            }
        };

        report.discovered = orders.len();
        if orders.is_empty() {
            info!("no pending orders found");
            report.elapsed_ms = elapsed_ms(started);
            return report;
        }

        let (tx, rx) = mpsc::channel::<Order>(self.config.queue_capacity);
        let ctx = Arc::new(WorkerContext {
            store: Arc::clone(&self.store),
            authority: Arc::clone(&self.authority),
            request_timeout: self.config.request_timeout,
            throttle: self.config.throttle_policy,
            max_backoff: self.config.max_backoff,
            cancel: cancel.clone(),
        });
        let mut workers = spawn_workers(self.config.workers, Arc::new(Mutex::new(rx)), ctx);

        for order in orders {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        dispatched = report.dispatched,
                        discovered = report.discovered,
                        "cycle cancelled, stopping dispatch"
                    );
                    break;
                }
                sent = tx.send(order) => {
                    if sent.is_err() {
                        // Every worker is gone; nothing left to feed.
                        break;
                    }
                    report.dispatched += 1;
                }
            }
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_report) => report.merge(&worker_report),
                Err(err) => error!(error = %err, "accrual worker terminated abnormally"),
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.elapsed_ms = elapsed_ms(started);
        info!(
            discovered = report.discovered,
            dispatched = report.dispatched,
            updated = report.updated,
            pending = report.pending,
            throttled = report.throttled,
            transport_failures = report.transport_failures,
            update_failures = report.update_failures,
            skipped = report.skipped,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "accrual cycle finished"
        );
        report
    }
}

fn elapsed_ms(started: std::time::Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
