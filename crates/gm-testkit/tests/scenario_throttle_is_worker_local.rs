//! Scenario: throttling delays only the worker that was throttled.
//!
//! # Invariants under test
//!
//! 1. While one worker backs off, the others keep draining the queue.
//! 2. The throttled order is not written under the default policy.
//! 3. Under the retry policy the same worker asks again after backing off.

use std::sync::Arc;
use std::time::Duration;

use gm_accrual::{AccrualEngine, EngineConfig, ThrottlePolicy};
use gm_schemas::OrderStatus;
use gm_testkit::{new_orders, processed, throttled, MemoryOrderStore, ScriptedAuthority};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn other_workers_continue_during_backoff() {
    let store = Arc::new(MemoryOrderStore::with_orders(new_orders(5)));
    let authority = Arc::new(
        ScriptedAuthority::new()
            .always(processed(2.0))
            .script("1", vec![throttled(30)])
            .with_delay(Duration::from_secs(1)),
    );
    let config = EngineConfig {
        workers: 2,
        queue_capacity: 2,
        ..EngineConfig::default()
    };
    let engine = Arc::new(AccrualEngine::new(store.clone(), authority.clone(), config).unwrap());

    let cycle = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run_cycle(&CancellationToken::new()).await })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!cycle.is_finished(), "throttled worker should still be backing off");
    assert_eq!(store.updates().len(), 4);
    assert!(store.updates_for("1").is_empty());

    let report = cycle.await.unwrap();
    assert_eq!(report.throttled, 1);
    assert_eq!(report.processed, 4);
    assert_eq!(store.get("1").unwrap().status, OrderStatus::New);
    assert_eq!(authority.calls_for("1"), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_policy_requeries_after_backoff() {
    let store = Arc::new(MemoryOrderStore::with_orders(new_orders(1)));
    let authority = Arc::new(
        ScriptedAuthority::new().script("1", vec![throttled(2), processed(7.0)]),
    );
    let config = EngineConfig {
        throttle_policy: ThrottlePolicy::RetryWithinCycle { max_attempts: 3 },
        ..EngineConfig::default()
    };
    let engine = AccrualEngine::new(store.clone(), authority.clone(), config).unwrap();

    let report = engine.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.processed, 1);
    assert_eq!(authority.calls_for("1"), 2);
    assert_eq!(store.get("1").unwrap().reward, Some(7.0));
}
