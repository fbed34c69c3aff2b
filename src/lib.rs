// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod feed;
pub mod metrics;
pub mod scheduler;
pub mod sentiment;
pub mod sync;

use std::sync::Arc;

// Convenient access to the router builder: `crate_root::api::router` or `crate_root::router`
pub use crate::api::router;
pub use crate::config::FeedConfig;
pub use crate::scheduler::{FeedScheduler, RefreshOutcome, SchedulerCfg, SchedulerState};
pub use crate::sync::{FeedResponse, SyncService};

/// Build the full HTTP app from config (generator chosen by `config.generator`).
pub fn app(cfg: FeedConfig) -> axum::Router {
    router(Arc::new(SyncService::from_config(cfg)))
}
