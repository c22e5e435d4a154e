//! gm-daemon library target.
//!
//! Exposes the CLI, router and state for integration tests.
//! The binary `main.rs` depends on this library target.

pub mod api_types;
pub mod cli;
pub mod routes;
pub mod state;
