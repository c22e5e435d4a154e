//! Periodic driver for [`AccrualEngine::run_cycle`].
//!
//! Cycles never overlap: a single gate serialises timer-driven cycles and
//! manual runs. Missed ticks during a slow cycle are skipped, not replayed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::AccrualEngine;
use crate::report::CycleReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    CycleRunning,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub cycles_completed: u64,
    pub last_report: Option<CycleReport>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            cycles_completed: 0,
            last_report: None,
            last_cycle_at: None,
        }
    }
}

pub type SharedSchedulerStatus = Arc<RwLock<SchedulerStatus>>;

pub struct Scheduler {
    engine: Arc<AccrualEngine>,
    interval: Duration,
    status: SharedSchedulerStatus,
    gate: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(engine: Arc<AccrualEngine>) -> Self {
        let interval = engine.config().poll_interval;
        Self {
            engine,
            interval,
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn status_handle(&self) -> SharedSchedulerStatus {
        Arc::clone(&self.status)
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Tick every `poll_interval` until `shutdown` fires. The first cycle
    /// starts one full interval after this call. Each cycle runs under a
    /// child of `shutdown`, so shutdown also cancels the cycle in flight.
    pub async fn start(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            workers = self.engine.config().workers,
            "accrual scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let gate = Arc::clone(&self.gate).lock_owned().await;
            if shutdown.is_cancelled() {
                break;
            }
            run_gated(
                Arc::clone(&self.engine),
                Arc::clone(&self.status),
                shutdown.child_token(),
                gate,
            )
            .await;
        }

        self.status.write().await.state = SchedulerState::Terminated;
        info!("accrual scheduler stopped");
    }

    /// Run one cycle immediately, outside the timer.
    ///
    /// Returns `None` when a cycle is already in progress or `shutdown`
    /// has fired.
    ///
    /// The cycle runs on its own task holding the gate, so dropping the
    /// returned future does not abort it: in-flight writes finish and the
    /// status still goes back to idle.
    pub async fn run_now(&self, shutdown: &CancellationToken) -> Option<CycleReport> {
        if shutdown.is_cancelled() {
            return None;
        }
        let Ok(gate) = Arc::clone(&self.gate).try_lock_owned() else {
            warn!("manual accrual cycle refused: a cycle is already running");
            return None;
        };

        let task = tokio::spawn(run_gated(
            Arc::clone(&self.engine),
            Arc::clone(&self.status),
            shutdown.child_token(),
            gate,
        ));
        match task.await {
            Ok(report) => Some(report),
            Err(err) => {
                error!(error = %err, "manual accrual cycle task failed");
                None
            }
        }
    }
}

async fn run_gated(
    engine: Arc<AccrualEngine>,
    status: SharedSchedulerStatus,
    cycle: CancellationToken,
    _gate: OwnedMutexGuard<()>,
) -> CycleReport {
    status.write().await.state = SchedulerState::CycleRunning;

    let report = engine.run_cycle(&cycle).await;

    let mut st = status.write().await;
    if st.state != SchedulerState::Terminated {
        st.state = SchedulerState::Idle;
    }
    st.cycles_completed += 1;
    st.last_report = Some(report.clone());
    st.last_cycle_at = Some(Utc::now());
    report
}
