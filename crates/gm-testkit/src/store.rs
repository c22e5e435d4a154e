//! In-memory [`OrderStore`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use gm_accrual::OrderStore;
use gm_schemas::{Order, OrderStatus};

/// One `update_status` call as the store received it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub number: String,
    pub status: OrderStatus,
    pub reward: Option<f64>,
}

#[derive(Default)]
struct Inner {
    orders: BTreeMap<String, Order>,
    updates: Vec<UpdateCall>,
    list_calls: usize,
    fail_list: bool,
    fail_updates: HashSet<String>,
}

/// Ledger held in a map. Records every update attempt, including failed
/// ones, and can be told to fail listing or specific updates.
///
/// Moving a terminal order is an error here, so any such attempt by the
/// engine surfaces as an `update_failures` count in tests.
#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        for order in orders {
            store.insert(order);
        }
        store
    }

    pub fn insert(&self, order: Order) {
        self.lock().orders.insert(order.number.clone(), order);
    }

    pub fn get(&self, number: &str) -> Option<Order> {
        self.lock().orders.get(number).cloned()
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.lock().updates.clone()
    }

    pub fn updates_for(&self, number: &str) -> Vec<UpdateCall> {
        self.lock()
            .updates
            .iter()
            .filter(|u| u.number == number)
            .cloned()
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_updates_for(&self, number: &str) {
        self.lock().fail_updates.insert(number.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the ledger from the rest.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl OrderStore for MemoryOrderStore {
    async fn list_pending(&self) -> Result<Vec<Order>> {
        let mut inner = self.lock();
        inner.list_calls += 1;
        if inner.fail_list {
            bail!("simulated list failure");
        }
        let mut pending: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.status.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.number.cmp(&b.number)));
        Ok(pending)
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        reward: Option<f64>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.updates.push(UpdateCall {
            number: order_number.to_string(),
            status,
            reward,
        });

        if inner.fail_updates.contains(order_number) {
            bail!("simulated update failure for order {order_number}");
        }

        let order = inner
            .orders
            .get_mut(order_number)
            .ok_or_else(|| anyhow!("unknown order {order_number}"))?;

        if order.status.is_terminal() {
            if order.status == status && order.reward == reward {
                return Ok(());
            }
            bail!(
                "order {order_number} is already {} and cannot move to {status}",
                order.status
            );
        }

        order.status = status;
        order.reward = reward;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_excludes_terminal() {
        let mut done = Order::new("2", 1);
        done.status = OrderStatus::Invalid;
        let store = MemoryOrderStore::with_orders([Order::new("1", 1), done]);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].number, "1");
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn terminal_order_is_never_moved() {
        let store = MemoryOrderStore::with_orders([Order::new("1", 1)]);
        store
            .update_status("1", OrderStatus::Processed, Some(5.0))
            .await
            .unwrap();
        // Same write again is a no-op.
        store
            .update_status("1", OrderStatus::Processed, Some(5.0))
            .await
            .unwrap();
        assert!(store
            .update_status("1", OrderStatus::Invalid, None)
            .await
            .is_err());

        let order = store.get("1").unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.reward, Some(5.0));
        assert_eq!(store.updates().len(), 3);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let store = MemoryOrderStore::with_orders([Order::new("1", 1)]);
        store.set_fail_list(true);
        assert!(store.list_pending().await.is_err());

        store.fail_updates_for("1");
        assert!(store
            .update_status("1", OrderStatus::Processing, None)
            .await
            .is_err());
        assert_eq!(store.get("1").unwrap().status, OrderStatus::New);
    }
}
