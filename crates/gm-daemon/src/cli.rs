//! Command-line flags and their precedence over YAML config.
//!
//! Every flag can also come from its environment variable. A flag or env var
//! that is present wins over the matching YAML key; absent ones leave the
//! YAML value (or its default) alone.

use anyhow::{bail, Result};
use clap::Parser;
use gm_config::{resolve_secrets, AccrualSettings};
use serde_json::Value;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "gm-daemon", version, about = "Loyalty accrual reconciliation daemon")]
pub struct Cli {
    /// YAML config layers, merged in order (later overrides earlier).
    #[arg(long = "config", num_args = 1..)]
    pub config: Vec<String>,

    /// Base URL of the accrual authority.
    #[arg(short = 'r', long = "accrual-system-address", env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual_system_address: Option<String>,

    /// Seconds between reconciliation cycles.
    #[arg(short = 'i', long = "update-interval", env = "UPDATE_INTERVAL")]
    pub update_interval: Option<u64>,

    /// Worker pool size.
    #[arg(short = 'w', long = "worker-count", env = "WORKER_COUNT")]
    pub worker_count: Option<usize>,

    /// Postgres connection string. Overrides the env var named in config.
    #[arg(
        short = 'd',
        long = "database-uri",
        env = "DATABASE_URI",
        hide_env_values = true
    )]
    pub database_uri: Option<String>,

    /// Listen address for the ops HTTP endpoints.
    #[arg(short = 'a', long = "run-address", env = "RUN_ADDRESS")]
    pub run_address: Option<String>,
}

impl Cli {
    /// Fold flag overrides into settings loaded from YAML.
    pub fn apply(&self, settings: &mut AccrualSettings) -> Result<()> {
        if let Some(addr) = &self.accrual_system_address {
            if addr.trim().is_empty() {
                bail!("--accrual-system-address must not be blank");
            }
            settings.base_url = normalize_base_url(addr);
        }
        if let Some(secs) = self.update_interval {
            if secs == 0 {
                bail!("--update-interval must be positive");
            }
            settings.poll_interval_secs = secs;
        }
        if let Some(n) = self.worker_count {
            if n == 0 {
                bail!("--worker-count must be positive");
            }
            // Queue bound follows the pool unless YAML pinned it explicitly.
            if !settings.queue_capacity_pinned {
                settings.queue_capacity = n;
            }
            settings.workers = n;
        }
        if let Some(addr) = &self.run_address {
            settings.bind_addr = addr.clone();
        }
        Ok(())
    }

    /// Database URL: `--database-uri` / `DATABASE_URI` first, then the env
    /// var named at `/database/url_env`.
    pub fn database_url(&self, config_json: &Value) -> Result<String> {
        match &self.database_uri {
            Some(uri) if !uri.trim().is_empty() => Ok(uri.clone()),
            _ => Ok(resolve_secrets(config_json)?.database_url),
        }
    }
}

/// Accept `host:port` as well as a full URL; default the scheme to http.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
