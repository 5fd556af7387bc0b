//! # lumen-server
//!
//! API server for the Lumen photo-sharing network.
//!
//! This binary provides:
//! - **REST API** (axum) for accounts, profiles, follows, posts, likes,
//!   comments, direct messages, notifications and search
//! - **Websocket channel** for presence, typing indicators, live message
//!   delivery and notification push
//! - **Image uploads** stored on local disk and served back by id
//! - **Per-IP rate limiting** to protect against abuse

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod fanout;
mod presence;
mod rate_limit;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumen_shared::constants::APP_NAME;
use lumen_store::Database;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::fanout::Fanout;
use crate::presence::PresenceRegistry;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lumen_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open_default()?,
    };
    info!(path = ?database.path(), "Database ready");
    let db = Arc::new(Mutex::new(database));

    // Upload store (creates directory if missing)
    let blob_store = Arc::new(
        BlobStore::new(
            config.upload_dir.clone(),
            config.max_upload_size,
            config.public_url.clone(),
        )
        .await?,
    );

    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);

    // Presence starts empty on every boot.
    let fanout = Fanout::new(db.clone(), PresenceRegistry::new());

    let http_addr = config.http_addr;
    let session_ttl_hours = config.session_ttl_hours;

    let app_state = AppState {
        db: db.clone(),
        fanout,
        blob_store,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // Hourly removal of expired sessions
    let sessions_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let Some(cutoff) = auth::session_cutoff(chrono::Utc::now(), session_ttl_hours) else {
                continue;
            };
            match sessions_db.lock().await.purge_sessions_before(cutoff) {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired sessions"),
                Err(e) => tracing::error!(error = %e, "Session purge failed"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
