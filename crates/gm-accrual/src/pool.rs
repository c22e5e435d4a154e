//! Fixed-size worker pool draining the cycle's task queue.
//!
//! Workers share one bounded `mpsc` receiver behind a mutex. The dispatcher
//! owns the only sender; dropping it closes the queue and each worker exits
//! once the remaining items are drained.

use std::sync::Arc;
use std::time::Duration;

use gm_schemas::Order;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::AccrualAuthority;
use crate::report::{CycleReport, OrderOutcome};
use crate::store::OrderStore;
use crate::throttle::{backoff, BackoffOutcome, ThrottlePolicy};
use crate::verdict::{Settlement, Verdict};

pub(crate) type TaskQueue = Arc<Mutex<mpsc::Receiver<Order>>>;

/// Everything a worker needs for one cycle.
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<dyn OrderStore>,
    pub(crate) authority: Arc<dyn AccrualAuthority>,
    pub(crate) request_timeout: Duration,
    pub(crate) throttle: ThrottlePolicy,
    pub(crate) max_backoff: Duration,
    /// Cycle-scoped token.
    pub(crate) cancel: CancellationToken,
}

/// Start `count` workers on `queue`. Each returns its own tally.
pub(crate) fn spawn_workers(
    count: usize,
    queue: TaskQueue,
    ctx: Arc<WorkerContext>,
) -> JoinSet<CycleReport> {
    let mut set = JoinSet::new();
    for worker in 0..count {
        set.spawn(worker_loop(worker, Arc::clone(&queue), Arc::clone(&ctx)));
    }
    set
}

async fn worker_loop(worker: usize, queue: TaskQueue, ctx: Arc<WorkerContext>) -> CycleReport {
    let mut report = CycleReport::default();

    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(order) = next else {
            break;
        };

        if ctx.cancel.is_cancelled() {
            debug!(worker, order_number = %order.number, "cycle cancelled, dropping queued order");
            report.record(OrderOutcome::Skipped);
            continue;
        }

        let outcome = process_order(&ctx, &order).await;
        debug!(worker, order_number = %order.number, ?outcome, "order handled");
        report.record(outcome);
    }

    report
}

/// Reconcile one order end-to-end: query, back off if throttled, write.
pub(crate) async fn process_order(ctx: &WorkerContext, order: &Order) -> OrderOutcome {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let deadline = Instant::now() + ctx.request_timeout;

        let verdict = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return OrderOutcome::Skipped,
            v = ctx.authority.fetch_verdict(&order.number, deadline) => v,
        };

        match verdict {
            Verdict::TransportFailure(err) => {
                info!(order_number = %order.number, error = %err, "failed to get order info");
                return OrderOutcome::TransportFailure;
            }
            Verdict::Pending => {
                debug!(order_number = %order.number, "accrual not started yet");
                return OrderOutcome::Pending;
            }
            Verdict::Throttled { retry_after } => {
                info!(
                    order_number = %order.number,
                    retry_after_secs = retry_after.as_secs(),
                    attempt = attempts,
                    "accrual authority is busy, backing off"
                );
                if backoff(&ctx.cancel, retry_after, ctx.max_backoff).await
                    == BackoffOutcome::Cancelled
                {
                    return OrderOutcome::Throttled;
                }
                if ctx.throttle.should_retry(attempts) {
                    continue;
                }
                return OrderOutcome::Throttled;
            }
            Verdict::Decided(settlement) => return apply(ctx, order, settlement).await,
        }
    }
}

async fn apply(ctx: &WorkerContext, order: &Order, settlement: Settlement) -> OrderOutcome {
    match ctx
        .store
        .update_status(&order.number, settlement.status(), settlement.reward())
        .await
    {
        Ok(()) => {
            debug!(
                order_number = %order.number,
                status = %settlement.status(),
                reward = ?settlement.reward(),
                "order reconciled"
            );
            OrderOutcome::Updated(settlement.status())
        }
        Err(err) => {
            warn!(order_number = %order.number, error = %format!("{err:#}"), "failed to update order accrual");
            OrderOutcome::UpdateFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::TransportError;
    use gm_schemas::OrderStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Answers every query with the next verdict from a fixed script,
    /// repeating the last one.
    struct Script {
        verdicts: Vec<Verdict>,
        calls: AtomicUsize,
    }

    impl Script {
        fn new(verdicts: Vec<Verdict>) -> Self {
            Self {
                verdicts,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl AccrualAuthority for Script {
        async fn fetch_verdict(&self, _n: &str, _deadline: Instant) -> Verdict {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let v = &self.verdicts;
            v.get(i).or_else(|| v.last()).cloned().unwrap()
        }
    }

    #[derive(Default)]
    struct Writes(StdMutex<Vec<(String, OrderStatus, Option<f64>)>>);

    #[async_trait::async_trait]
    impl OrderStore for Writes {
        async fn list_pending(&self) -> anyhow::Result<Vec<Order>> {
            Ok(vec![])
        }
        async fn update_status(
            &self,
            n: &str,
            status: OrderStatus,
            reward: Option<f64>,
        ) -> anyhow::Result<()> {
            self.0.lock().unwrap().push((n.to_string(), status, reward));
            Ok(())
        }
    }

    fn ctx(
        authority: Arc<dyn AccrualAuthority>,
        store: Arc<dyn OrderStore>,
        throttle: ThrottlePolicy,
    ) -> WorkerContext {
        WorkerContext {
            store,
            authority,
            request_timeout: Duration::from_secs(5),
            throttle,
            max_backoff: Duration::from_secs(60),
            cancel: CancellationToken::new(),
        }
    }

    fn processed_42() -> Verdict {
        Verdict::Decided(Settlement::new(OrderStatus::Processed, Some(42.0)))
    }

    fn throttled_1s() -> Verdict {
        Verdict::Throttled {
            retry_after: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn decided_verdict_writes_once() {
        let store = Arc::new(Writes::default());
        let c = ctx(
            Arc::new(Script::new(vec![processed_42()])),
            store.clone(),
            ThrottlePolicy::DeferToNextCycle,
        );
        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::Updated(OrderStatus::Processed));
        assert_eq!(
            *store.0.lock().unwrap(),
            vec![("12345678903".to_string(), OrderStatus::Processed, Some(42.0))]
        );
    }

    #[tokio::test]
    async fn transport_failure_writes_nothing() {
        let store = Arc::new(Writes::default());
        let c = ctx(
            Arc::new(Script::new(vec![Verdict::TransportFailure(
                TransportError::UnexpectedStatus(502),
            )])),
            store.clone(),
            ThrottlePolicy::DeferToNextCycle,
        );
        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::TransportFailure);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_defers_without_requery() {
        let authority = Arc::new(Script::new(vec![throttled_1s(), processed_42()]));
        let store = Arc::new(Writes::default());
        let c = ctx(authority.clone(), store.clone(), ThrottlePolicy::DeferToNextCycle);

        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::Throttled);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_retry_policy_requeries_after_backoff() {
        let authority = Arc::new(Script::new(vec![throttled_1s(), processed_42()]));
        let store = Arc::new(Writes::default());
        let c = ctx(
            authority.clone(),
            store.clone(),
            ThrottlePolicy::RetryWithinCycle { max_attempts: 3 },
        );

        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::Updated(OrderStatus::Processed));
        assert_eq!(authority.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_retry_policy_gives_up_after_max_attempts() {
        let authority = Arc::new(Script::new(vec![throttled_1s()]));
        let store = Arc::new(Writes::default());
        let c = ctx(
            authority.clone(),
            store.clone(),
            ThrottlePolicy::RetryWithinCycle { max_attempts: 2 },
        );

        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::Throttled);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 2);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_cycle_skips_without_query() {
        let authority = Arc::new(Script::new(vec![processed_42()]));
        let store = Arc::new(Writes::default());
        let c = ctx(authority.clone(), store.clone(), ThrottlePolicy::DeferToNextCycle);
        c.cancel.cancel();

        let out = process_order(&c, &Order::new("12345678903", 1)).await;
        assert_eq!(out, OrderOutcome::Skipped);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
    }
}
