//! gm-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, resolves config,
//! wires the accrual engine to Postgres and the authority, starts the
//! scheduler and serves the ops endpoints until Ctrl-C / SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gm_accrual::HttpAccrualClient;
use gm_config::{report_unused_keys, AccrualSettings, LoadedConfig, UnusedKeyPolicy};
use gm_daemon::{cli::Cli, routes, state};
use gm_db::PgOrderStore;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    let loaded = if cli.config.is_empty() {
        LoadedConfig::empty()?
    } else {
        let paths: Vec<&str> = cli.config.iter().map(String::as_str).collect();
        gm_config::load_layered_yaml(&paths)?
    };
    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config contains keys nothing reads");
    }

    let mut settings = AccrualSettings::from_config_json(&loaded.config_json)?;
    cli.apply(&mut settings)?;
    let database_url = cli.database_url(&loaded.config_json)?;

    info!(
        config_hash = %loaded.config_hash,
        accrual_base_url = %settings.base_url,
        poll_interval_secs = settings.poll_interval_secs,
        workers = settings.workers,
        "gm-daemon configured"
    );

    let pool = gm_db::connect(&database_url).await?;
    gm_db::migrate(&pool).await?;
    info!("migrations applied");

    let store = Arc::new(PgOrderStore::new(pool));
    let authority = Arc::new(HttpAccrualClient::new(settings.base_url.clone()));
    let scheduler = state::build_scheduler(store, authority, &settings)?;

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let token = shutdown.clone();
        tokio::spawn(async move { scheduler.start(token).await })
    };

    let shared = Arc::new(state::AppState::new(
        scheduler,
        shutdown.clone(),
        loaded.config_hash.clone(),
    ));
    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("gm-daemon listening on http://{}", settings.bind_addr);

    let server_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .context("server crashed")?;

    // The server only returns early on its own; make sure the scheduler stops too.
    shutdown.cancel();
    if let Err(err) = scheduler_task.await {
        error!(error = %err, "accrual scheduler task failed");
    }
    info!("gm-daemon stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Trip `shutdown` on Ctrl-C, or SIGTERM on unix.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => {
                    error!(error = %err, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Ctrl-C received, shutting down"),
            _ = terminate => info!("SIGTERM received, shutting down"),
        }
        shutdown.cancel();
    });
}
