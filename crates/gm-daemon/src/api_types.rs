//! Request and response types for the gm-daemon ops endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub daemon_uptime_secs: u64,
    /// SHA-256 of the canonical effective config the daemon booted with.
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// /v1/accrual/run refusal (409)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRefusedResponse {
    pub error: String,
}
