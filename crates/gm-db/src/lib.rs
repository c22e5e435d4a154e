//! gm-db
//!
//! Postgres persistence for the order ledger and the [`OrderStore`]
//! implementation used by the accrual engine.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gm_accrual::OrderStore;
use gm_schemas::{Order, OrderStatus};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::debug;

pub const ENV_DB_URL: &str = "GM_DATABASE_URL";

/// Connect to Postgres using GM_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Insert an account and return its id.
pub async fn insert_user(pool: &PgPool, login: &str, password_hash: &str) -> Result<i64> {
    let (user_id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into users (login, password)
        values ($1, $2)
        returning user_id
        "#,
    )
    .bind(login)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .with_context(|| format!("insert_user failed for login={login}"))?;

    Ok(user_id)
}

/// Insert an order row as-is (status, reward and upload time included).
pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        insert into orders (number, user_id, status, accrual, uploaded_at)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&order.number)
    .bind(order.owner)
    .bind(order.status.as_str())
    .bind(order.reward)
    .bind(order.uploaded_at)
    .execute(pool)
    .await
    .with_context(|| format!("insert_order failed for number={}", order.number))?;

    Ok(())
}

pub async fn fetch_order(pool: &PgPool, number: &str) -> Result<Option<Order>> {
    let row = sqlx::query(
        r#"
        select number, user_id, status, accrual, uploaded_at
        from orders
        where number = $1
        "#,
    )
    .bind(number)
    .fetch_optional(pool)
    .await
    .context("fetch_order failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// All orders whose status is NEW or PROCESSING, oldest upload first.
pub async fn list_pending_orders(pool: &PgPool) -> Result<Vec<Order>> {
    let rows = sqlx::query(
        r#"
        select number, user_id, status, accrual, uploaded_at
        from orders
        where status in ('NEW','PROCESSING')
        order by uploaded_at asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_pending_orders failed")?;

    rows.iter().map(order_from_row).collect()
}

/// Move a pending order to `status`. Returns the number of rows changed:
/// 0 when the order is unknown or already terminal.
pub async fn update_order_status(
    pool: &PgPool,
    number: &str,
    status: OrderStatus,
    reward: Option<f64>,
) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update orders
           set status = $2,
               accrual = $3
         where number = $1
           and status in ('NEW','PROCESSING')
        "#,
    )
    .bind(number)
    .bind(status.as_str())
    .bind(reward)
    .execute(pool)
    .await
    .with_context(|| format!("update_order_status failed for number={number}"))?;

    Ok(res.rows_affected())
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at")?;
    Ok(Order {
        number: row.try_get("number")?,
        status: OrderStatus::parse(&status)?,
        reward: row.try_get("accrual")?,
        owner: row.try_get("user_id")?,
        uploaded_at,
    })
}

/// [`OrderStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl OrderStore for PgOrderStore {
    async fn list_pending(&self) -> Result<Vec<Order>> {
        list_pending_orders(&self.pool).await
    }

    async fn update_status(
        &self,
        order_number: &str,
        status: OrderStatus,
        reward: Option<f64>,
    ) -> Result<()> {
        let changed = update_order_status(&self.pool, order_number, status, reward).await?;
        if changed == 0 {
            // Already terminal (or removed): nothing to do, and never an error.
            debug!(order_number, %status, "order no longer pending, update ignored");
        }
        Ok(())
    }
}
