use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use handlers::AppState;
use services::{
    object_store::GithubContentsStore, session_buffer::SessionBuffer,
    upload_coordinator::UploadCoordinator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-relay with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url, 5).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let store = GithubContentsStore::new(&cfg.upload).context("configuring content store")?;
    let sessions = SessionBuffer::new();
    let coordinator = UploadCoordinator::new(&cfg.upload, db.clone(), sessions.clone(), Arc::new(store));

    spawn_session_sweeper(
        sessions,
        Duration::from_secs(cfg.session_ttl_secs),
        Duration::from_secs(cfg.sweep_interval_secs.max(1)),
    );

    // --- Build router ---
    let state = AppState {
        coordinator,
        max_upload_bytes: cfg.max_upload_bytes,
    };
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop sessions whose clients stopped sending chunks and
/// never completed.
fn spawn_session_sweeper(sessions: SessionBuffer, ttl: Duration, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = sessions.sweep_expired(ttl);
            if removed > 0 {
                tracing::info!("Swept {} idle upload sessions", removed);
            }
        }
    });
}
