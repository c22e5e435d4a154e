//! Scenario: PgOrderStore lists only pending orders and never moves a
//! terminal one.
//!
//! DB-backed test. Skips if `GM_DATABASE_URL` is not set.

use chrono::Utc;
use gm_accrual::OrderStore;
use gm_db::PgOrderStore;
use gm_schemas::{Order, OrderStatus};
use sqlx::PgPool;

async fn pool_or_skip() -> Option<PgPool> {
    let url = match std::env::var(gm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: GM_DATABASE_URL not set");
            return None;
        }
    };
    let pool = match gm_db::connect(&url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("SKIP: cannot connect to DB: {e:#}");
            return None;
        }
    };
    if let Err(e) = gm_db::migrate(&pool).await {
        eprintln!("SKIP: cannot migrate DB: {e:#}");
        return None;
    }
    Some(pool)
}

/// Unique per test run so reruns against the same DB do not collide.
fn unique(tag: &str) -> String {
    format!("{tag}{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn order(number: &str, owner: i64, status: OrderStatus, reward: Option<f64>) -> Order {
    Order {
        status,
        reward,
        ..Order::new(number, owner)
    }
}

#[tokio::test]
async fn list_pending_excludes_terminal_orders() -> anyhow::Result<()> {
    let Some(pool) = pool_or_skip().await else {
        return Ok(());
    };
    let owner = gm_db::insert_user(&pool, &unique("list-"), "hash").await?;

    let new = unique("1");
    let processing = unique("2");
    let processed = unique("3");
    let invalid = unique("4");
    gm_db::insert_order(&pool, &order(&new, owner, OrderStatus::New, None)).await?;
    gm_db::insert_order(&pool, &order(&processing, owner, OrderStatus::Processing, None)).await?;
    gm_db::insert_order(&pool, &order(&processed, owner, OrderStatus::Processed, Some(5.0))).await?;
    gm_db::insert_order(&pool, &order(&invalid, owner, OrderStatus::Invalid, None)).await?;

    let store = PgOrderStore::new(pool.clone());
    let pending: Vec<String> = store
        .list_pending()
        .await?
        .into_iter()
        .filter(|o| o.owner == owner)
        .map(|o| o.number)
        .collect();

    assert_eq!(pending.len(), 2);
    assert!(pending.contains(&new));
    assert!(pending.contains(&processing));
    Ok(())
}

#[tokio::test]
async fn update_settles_pending_and_ignores_terminal() -> anyhow::Result<()> {
    let Some(pool) = pool_or_skip().await else {
        return Ok(());
    };
    let owner = gm_db::insert_user(&pool, &unique("upd-"), "hash").await?;
    let number = unique("5");
    gm_db::insert_order(&pool, &order(&number, owner, OrderStatus::New, None)).await?;

    let store = PgOrderStore::new(pool.clone());

    store
        .update_status(&number, OrderStatus::Processing, None)
        .await?;
    let row = gm_db::fetch_order(&pool, &number).await?.expect("order row");
    assert_eq!(row.status, OrderStatus::Processing);
    assert_eq!(row.reward, None);

    store
        .update_status(&number, OrderStatus::Processed, Some(729.98))
        .await?;
    // Same write again is harmless.
    store
        .update_status(&number, OrderStatus::Processed, Some(729.98))
        .await?;
    // A terminal order is never moved.
    store.update_status(&number, OrderStatus::Invalid, None).await?;

    let row = gm_db::fetch_order(&pool, &number).await?.expect("order row");
    assert_eq!(row.status, OrderStatus::Processed);
    assert_eq!(row.reward, Some(729.98));
    assert_eq!(row.owner, owner);
    Ok(())
}

#[tokio::test]
async fn unknown_status_is_rejected_by_check_constraint() -> anyhow::Result<()> {
    let Some(pool) = pool_or_skip().await else {
        return Ok(());
    };
    let owner = gm_db::insert_user(&pool, &unique("chk-"), "hash").await?;

    let err = sqlx::query("insert into orders (number, user_id, status) values ($1, $2, 'REGISTERED')")
        .bind(unique("6"))
        .bind(owner)
        .execute(&pool)
        .await
        .expect_err("REGISTERED is not a ledger status");

    match err {
        sqlx::Error::Database(db) => assert_eq!(db.code().as_deref(), Some("23514")),
        other => panic!("expected check violation, got {other:?}"),
    }
    Ok(())
}
