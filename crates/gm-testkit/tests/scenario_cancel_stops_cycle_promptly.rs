//! Scenario: cancelling a cycle stops it promptly.
//!
//! # Invariants under test
//!
//! 1. Orders still queued when the cycle token fires are not written.
//! 2. The cycle returns without waiting out the remaining queries.
//! 3. The report marks the cycle as cancelled.

use std::sync::Arc;
use std::time::Duration;

use gm_accrual::{AccrualEngine, EngineConfig};
use gm_testkit::{new_orders, processed, MemoryOrderStore, ScriptedAuthority};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancel_midway_leaves_queued_orders_alone() {
    let cancel = CancellationToken::new();
    let store = Arc::new(MemoryOrderStore::with_orders(new_orders(10)));
    let authority = Arc::new(
        ScriptedAuthority::new()
            .always(processed(1.0))
            .with_delay(Duration::from_secs(1))
            .cancel_after(5, cancel.clone()),
    );
    let config = EngineConfig {
        workers: 1,
        queue_capacity: 1,
        ..EngineConfig::default()
    };
    let engine = AccrualEngine::new(store.clone(), authority.clone(), config).unwrap();

    let started = Instant::now();
    let report = engine.run_cycle(&cancel).await;
    let elapsed = started.elapsed();

    assert!(store.updates().len() < 10);
    assert_eq!(store.updates().len(), 4);
    assert!(report.cancelled);
    assert!(report.dispatched < 10);
    assert!(report.skipped >= 1);
    // Four completed queries, then an immediate stop.
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_throttle_backoff() {
    let cancel = CancellationToken::new();
    let store = Arc::new(MemoryOrderStore::with_orders(new_orders(1)));
    let authority = Arc::new(ScriptedAuthority::new().always(gm_testkit::throttled(60)));
    let engine =
        AccrualEngine::new(store.clone(), authority.clone(), EngineConfig::default()).unwrap();

    let trip = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trip.cancel();
    });

    let started = Instant::now();
    let report = engine.run_cycle(&cancel).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.throttled, 1);
    assert!(report.cancelled);
    assert!(store.updates().is_empty());
}

#[tokio::test]
async fn already_cancelled_token_dispatches_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let store = Arc::new(MemoryOrderStore::with_orders(new_orders(3)));
    let authority = Arc::new(ScriptedAuthority::new().always(processed(1.0)));
    let engine =
        AccrualEngine::new(store.clone(), authority.clone(), EngineConfig::default()).unwrap();

    let report = engine.run_cycle(&cancel).await;
    assert_eq!(report.discovered, 3);
    assert_eq!(report.dispatched, 0);
    assert_eq!(authority.call_count(), 0);
    assert!(store.updates().is_empty());
}
