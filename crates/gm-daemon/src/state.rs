//! Shared runtime state for gm-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The scheduler itself
//! runs on a task spawned by `main.rs`; handlers only read its status or ask
//! it for a manual cycle.

use std::sync::Arc;
use std::time::Duration;

use gm_accrual::{
    AccrualAuthority, AccrualEngine, EngineConfig, OrderStore, Scheduler, ThrottlePolicy,
};
use gm_config::{AccrualSettings, ThrottleMode};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub scheduler: Arc<Scheduler>,
    /// Process-wide shutdown token. Manual cycles run under a child of it.
    pub shutdown: CancellationToken,
    pub config_hash: String,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, shutdown: CancellationToken, config_hash: String) -> Self {
        Self {
            build: BuildInfo {
                service: "gm-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            scheduler,
            shutdown,
            config_hash,
        }
    }
}

/// Engine tuning from the effective settings.
pub fn engine_config(settings: &AccrualSettings) -> EngineConfig {
    let throttle_policy = match settings.throttle_mode {
        ThrottleMode::Defer => ThrottlePolicy::DeferToNextCycle,
        ThrottleMode::Retry => ThrottlePolicy::RetryWithinCycle {
            max_attempts: settings.throttle_max_attempts,
        },
    };
    EngineConfig {
        workers: settings.workers,
        poll_interval: Duration::from_secs(settings.poll_interval_secs),
        request_timeout: Duration::from_secs(settings.request_timeout_secs),
        queue_capacity: settings.queue_capacity,
        throttle_policy,
        max_backoff: Duration::from_secs(settings.max_backoff_secs),
    }
}

/// Wire engine and scheduler over the given ports.
pub fn build_scheduler(
    store: Arc<dyn OrderStore>,
    authority: Arc<dyn AccrualAuthority>,
    settings: &AccrualSettings,
) -> anyhow::Result<Arc<Scheduler>> {
    let engine = AccrualEngine::new(store, authority, engine_config(settings))?;
    Ok(Arc::new(Scheduler::new(Arc::new(engine))))
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
