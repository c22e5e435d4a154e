//! gm-testkit
//!
//! In-memory doubles for the accrual engine's two ports, used by the
//! scenario tests in this crate and by `gm-daemon`'s route tests.

mod authority;
mod store;

pub use authority::ScriptedAuthority;
pub use store::{MemoryOrderStore, UpdateCall};

use gm_accrual::{Settlement, Verdict};
use gm_schemas::{Order, OrderStatus};
use std::time::Duration;

/// `n` pending `NEW` orders numbered `"1"..="n"`, all owned by account 1.
pub fn new_orders(n: usize) -> Vec<Order> {
    (1..=n).map(|i| Order::new(i.to_string(), 1)).collect()
}

pub fn processed(reward: f64) -> Verdict {
    Verdict::Decided(Settlement::new(OrderStatus::Processed, Some(reward)))
}

pub fn invalid() -> Verdict {
    Verdict::Decided(Settlement::new(OrderStatus::Invalid, None))
}

pub fn processing() -> Verdict {
    Verdict::Decided(Settlement::new(OrderStatus::Processing, None))
}

pub fn throttled(secs: u64) -> Verdict {
    Verdict::Throttled {
        retry_after: Duration::from_secs(secs),
    }
}
