//! Scenario: migrations can be applied repeatedly.
//!
//! DB-backed test. Skips if `GM_DATABASE_URL` is not set.

#[tokio::test]
async fn migrate_twice_is_a_no_op() -> anyhow::Result<()> {
    let url = match std::env::var(gm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: GM_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = gm_db::connect(&url).await?;
    gm_db::migrate(&pool).await?;
    gm_db::migrate(&pool).await?;

    for table in ["users", "orders", "withdrawals"] {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema = 'public' and table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&pool)
        .await?;
        assert!(exists, "table {table} missing after migrate");
    }

    Ok(())
}
