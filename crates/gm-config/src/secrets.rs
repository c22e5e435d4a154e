//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"GM_DATABASE_URL"`).
//! - At startup, callers invoke [`resolve_secrets`] once and pass the
//!   result into constructors; never scatter `std::env::var` calls.
//! - `Debug` redacts values; errors name the variable, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_DATABASE_URL_ENV: &str = "GM_DATABASE_URL";

/// Secrets for one daemon instantiation. **Values are redacted in `Debug`.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Env var the database URL was read from.
    pub database_url_env: String,
    pub database_url: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &"<REDACTED>")
            .finish()
    }
}

/// Read a non-empty string value at `pointer`.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Name of the env var that holds the database URL.
pub fn database_url_env_name(config_json: &Value) -> String {
    read_str_at(config_json, "/database/url_env")
        .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string())
}

/// Resolve all secrets from the environment.
///
/// # Errors
/// `SECRETS_MISSING` naming the first required variable that is unset.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let database_url_env = database_url_env_name(config_json);
    let Some(database_url) = resolve_env(&database_url_env) else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
            database_url_env
        );
    };

    Ok(ResolvedSecrets {
        database_url_env,
        database_url,
    })
}
