//! Feed sync service: binary entrypoint.
//! Boots the Axum HTTP server, wiring config, the sync service, and metrics.

use std::sync::Arc;

use feed_sync::{api, metrics::Metrics, FeedConfig, SyncService};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON lines when FEED_LOG_JSON=1.
/// Uses `try_init` so an already-installed runtime subscriber wins.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed=info,feed_sync=info,warn"));

    let json = std::env::var("FEED_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedConfig::load_default()?;
    let ttl_secs = cfg.cache_ttl_secs;
    let sync = Arc::new(SyncService::from_config(cfg));

    let mut router = api::router(sync);
    match Metrics::init(ttl_secs) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}
