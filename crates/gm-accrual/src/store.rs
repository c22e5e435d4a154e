//! Order Store Port: the only persistence the engine needs.
//!
//! Implemented outside this crate (`gm-db` for Postgres, `gm-testkit` in
//! memory). Implementations must serialize concurrent updates to one order
//! themselves; the engine holds no locks around store calls.

use anyhow::Result;
use gm_schemas::{Order, OrderStatus};

#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// All orders whose status is `NEW` or `PROCESSING`, in any order.
    ///
    /// "Nothing pending" is `Ok(vec![])`, never an error.
    async fn list_pending(&self) -> Result<Vec<Order>>;

    /// Single-row status update.
    ///
    /// `reward` is `Some` only for `PROCESSED`. Applying the same arguments
    /// twice must be harmless, and a terminal order must never be moved.
    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        reward: Option<f64>,
    ) -> Result<()>;
}
