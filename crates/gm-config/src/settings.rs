//! Typed accrual-engine settings extracted from the merged config JSON.
//!
//! Every key is optional; absent keys fall back to the service defaults.
//! Present-but-invalid keys (wrong type, zero, negative) are errors: a typo
//! must never silently become a default.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// What a worker does with an order the authority throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleMode {
    /// Sleep out the delay, leave the order for the next cycle.
    Defer,
    /// Sleep out the delay, then ask again (bounded by `max_attempts`).
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualSettings {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub request_timeout_secs: u64,
    /// Defaults to `workers` when absent.
    pub queue_capacity: usize,
    /// True when config set `queue_capacity` itself.
    #[serde(default)]
    pub queue_capacity_pinned: bool,
    pub max_backoff_secs: u64,
    pub throttle_mode: ThrottleMode,
    pub throttle_max_attempts: u32,
    pub bind_addr: String,
}

impl Default for AccrualSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            workers: DEFAULT_WORKERS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            queue_capacity: DEFAULT_WORKERS,
            queue_capacity_pinned: false,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            throttle_mode: ThrottleMode::Defer,
            throttle_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AccrualSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let d = Self::default();

        let workers = read_positive(config, "/accrual/workers")?
            .map(|n| n as usize)
            .unwrap_or(d.workers);

        let throttle_mode = match read_str(config, "/accrual/throttle/policy")? {
            None => d.throttle_mode,
            Some(s) => match s.trim().to_ascii_lowercase().as_str() {
                "defer" => ThrottleMode::Defer,
                "retry" => ThrottleMode::Retry,
                other => bail!(
                    "CONFIG_INVALID /accrual/throttle/policy: '{}' (expected defer | retry)",
                    other
                ),
            },
        };

        let throttle_max_attempts = match read_positive(config, "/accrual/throttle/max_attempts")? {
            None => d.throttle_max_attempts,
            Some(n) => u32::try_from(n).map_err(|_| {
                anyhow::anyhow!("CONFIG_INVALID /accrual/throttle/max_attempts: {} too large", n)
            })?,
        };

        let pinned_capacity =
            read_positive(config, "/accrual/queue_capacity")?.map(|n| n as usize);

        let settings = Self {
            base_url: read_str(config, "/accrual/base_url")?.unwrap_or(d.base_url),
            poll_interval_secs: read_positive(config, "/accrual/poll_interval_secs")?
                .unwrap_or(d.poll_interval_secs),
            workers,
            request_timeout_secs: read_positive(config, "/accrual/request_timeout_secs")?
                .unwrap_or(d.request_timeout_secs),
            queue_capacity: pinned_capacity.unwrap_or(workers),
            queue_capacity_pinned: pinned_capacity.is_some(),
            max_backoff_secs: read_positive(config, "/accrual/max_backoff_secs")?
                .unwrap_or(d.max_backoff_secs),
            throttle_mode,
            throttle_max_attempts,
            bind_addr: read_str(config, "/daemon/bind_addr")?.unwrap_or(d.bind_addr),
        };

        if settings.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID /accrual/base_url: must not be blank");
        }

        Ok(settings)
    }
}

fn read_str(config: &Value, pointer: &str) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("CONFIG_INVALID {}: expected string, got {}", pointer, other),
    }
}

fn read_positive(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(Some(n)),
            _ => bail!(
                "CONFIG_INVALID {}: expected positive integer, got {}",
                pointer,
                v
            ),
        },
    }
}
