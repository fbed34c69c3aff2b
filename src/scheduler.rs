//! # Feed polling scheduler
//! Client-side holder of the last good feed, refreshed on a timer while the
//! consumer is observing it.
//!
//! - State is seeded from the fallback pool at construction, so it is never empty.
//! - The first real fetch happens after `initial_delay`; then every `interval`.
//! - `set_observed(false)` stops the timer; `set_observed(true)` refreshes at once
//!   and restarts it.
//! - Every refresh gets its own cancellation token and sequence number. Starting a
//!   refresh cancels the previous one, and a result is applied only if its sequence
//!   number is still the latest.
//! - Failures never clear items. `error` is set only while no fetch has succeeded yet.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::client::FeedSource;
use crate::feed::fallback::FallbackPool;
use crate::feed::rank::rank;
use crate::feed::types::{distinct_sources, Category, ContentItem, FeedQuery, DEFAULT_LIMIT};
use crate::sentiment::SentimentStats;
use crate::sync::FeedResponse;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub category: Option<Category>,
    pub limit: usize,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            initial_delay: Duration::from_secs(1),
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// What a consumer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// Last known-good items; never empty.
    pub items: Vec<ContentItem>,
    /// Time of the last applied fetch (`None` while only seed data is held).
    pub last_updated: Option<DateTime<Utc>>,
    pub is_real_time: bool,
    pub sources: Vec<String>,
    pub sentiment: SentimentStats,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub error: Option<String>,
}

impl SchedulerState {
    fn seeded(items: Vec<ContentItem>) -> Self {
        Self {
            sources: distinct_sources(&items),
            sentiment: SentimentStats::from_items(&items),
            items,
            last_updated: None,
            is_real_time: false,
            is_loading: true,
            is_refreshing: false,
            error: None,
        }
    }

    fn apply(&mut self, resp: FeedResponse) {
        self.sources = distinct_sources(&resp.items);
        self.sentiment = SentimentStats::from_items(&resp.items);
        self.items = resp.items;
        self.last_updated = Some(resp.last_updated);
        self.is_real_time = resp.is_real_time;
        self.is_loading = false;
        self.is_refreshing = false;
        self.error = None;
    }

    pub fn has_fetched(&self) -> bool {
        self.last_updated.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Transport error or unusable payload; existing items kept.
    Failed,
    /// Superseded by a newer refresh or scheduler shut down; result discarded.
    Cancelled,
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

struct Inner {
    source: Arc<dyn FeedSource>,
    cfg: SchedulerCfg,
    state: watch::Sender<SchedulerState>,
    observed: watch::Sender<bool>,
    inflight: Mutex<InFlight>,
    shutdown: CancellationToken,
}

impl Inner {
    fn lock_inflight(&self) -> MutexGuard<'_, InFlight> {
        self.inflight.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn query(&self, force: bool) -> FeedQuery {
        FeedQuery {
            category: self.cfg.category,
            limit: self.cfg.limit,
            force_refresh: force,
        }
    }

    async fn refresh(&self, force: bool) -> RefreshOutcome {
        let (seq, token) = {
            let mut g = self.lock_inflight();
            g.token.cancel();
            g.seq += 1;
            g.token = self.shutdown.child_token();
            self.state.send_modify(|s| s.is_refreshing = true);
            (g.seq, g.token.clone())
        };

        let query = self.query(force);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            r = self.source.fetch(&query) => Some(r),
        };

        // Check and apply under the same lock a newer refresh takes to register.
        let g = self.lock_inflight();
        if g.seq != seq {
            tracing::debug!(target: "feed::scheduler", seq, latest = g.seq, "refresh superseded; result discarded");
            return RefreshOutcome::Cancelled;
        }
        let result = match result {
            Some(r) if !token.is_cancelled() => r,
            _ => {
                tracing::debug!(target: "feed::scheduler", seq, "refresh cancelled");
                self.state.send_modify(|s| s.is_refreshing = false);
                return RefreshOutcome::Cancelled;
            }
        };

        let outcome = match result {
            Ok(resp) if !resp.items.is_empty() => {
                tracing::debug!(
                    target: "feed::scheduler",
                    seq,
                    items = resp.items.len(),
                    real_time = resp.is_real_time,
                    "refresh applied"
                );
                self.state.send_modify(|s| s.apply(resp));
                RefreshOutcome::Applied
            }
            Ok(_) => {
                self.record_failure(seq, "feed returned no items".to_string());
                RefreshOutcome::Failed
            }
            Err(e) => {
                self.record_failure(seq, format!("{e:#}"));
                RefreshOutcome::Failed
            }
        };
        drop(g);
        outcome
    }

    fn record_failure(&self, seq: u64, error: String) {
        let surfaced = !self.state.borrow().has_fetched();
        tracing::warn!(
            target: "feed::scheduler",
            seq,
            error = %error,
            surfaced,
            "refresh failed; keeping last good items"
        );
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.is_refreshing = false;
            if surfaced {
                s.error = Some(error);
            }
        });
    }
}

/// Owns one polling loop. Dropping it stops the loop and cancels any refresh.
pub struct FeedScheduler {
    inner: Arc<Inner>,
    driver: JoinHandle<()>,
}

impl FeedScheduler {
    /// Seed state from the fallback pool and start the timer loop.
    /// Must be called within a Tokio runtime.
    pub fn start(source: Arc<dyn FeedSource>, mut cfg: SchedulerCfg) -> Self {
        if cfg.limit == 0 {
            cfg.limit = DEFAULT_LIMIT;
        }
        let seed = FallbackPool::default().generate_for(cfg.category, cfg.limit);
        let seed = rank(seed, cfg.category, cfg.limit);
        let (state, _) = watch::channel(SchedulerState::seeded(seed));
        let (observed, observed_rx) = watch::channel(true);

        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            source,
            cfg,
            state,
            observed,
            inflight: Mutex::new(InFlight {
                seq: 0,
                token: shutdown.child_token(),
            }),
            shutdown,
        });

        let driver = tokio::spawn(run(Arc::clone(&inner), observed_rx));
        tracing::info!(
            target: "feed::scheduler",
            interval_secs = cfg.interval.as_secs(),
            category = cfg.category.map(|c| c.as_str()).unwrap_or("all"),
            limit = cfg.limit,
            "scheduler started"
        );
        Self { inner, driver }
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state.subscribe()
    }

    /// Observation signal; the loop reacts to transitions only.
    pub fn set_observed(&self, observed: bool) {
        self.inner.observed.send_if_modified(|cur| {
            let changed = *cur != observed;
            *cur = observed;
            changed
        });
    }

    pub fn is_observed(&self) -> bool {
        *self.inner.observed.borrow()
    }

    /// Refresh now, superseding any refresh still in flight.
    pub async fn refresh_now(&self, force: bool) -> RefreshOutcome {
        self.inner.refresh(force).await
    }

    /// Invalidate the service cache, then force a refresh.
    pub async fn clear_cache_and_refresh(&self) -> RefreshOutcome {
        if let Err(e) = self.inner.source.clear_cache().await {
            tracing::warn!(target: "feed::scheduler", error = ?e, "clear-cache failed; refreshing anyway");
        }
        self.inner.refresh(true).await
    }

    /// Stop the loop and cancel any in-flight refresh. State stays readable.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }
}

impl Drop for FeedScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

fn spawn_refresh(inner: &Arc<Inner>) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        inner.refresh(false).await;
    });
}

async fn run(inner: Arc<Inner>, mut observed_rx: watch::Receiver<bool>) {
    let mut observed = *observed_rx.borrow_and_update();
    let mut next = Instant::now() + inner.cfg.initial_delay;

    loop {
        if observed {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                changed = observed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*observed_rx.borrow_and_update() {
                        observed = false;
                        tracing::debug!(target: "feed::scheduler", "consumer hidden; polling paused");
                    }
                }
                _ = time::sleep_until(next) => {
                    spawn_refresh(&inner);
                    next = Instant::now() + inner.cfg.interval;
                }
            }
        } else {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                changed = observed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *observed_rx.borrow_and_update() {
                        observed = true;
                        tracing::debug!(target: "feed::scheduler", "consumer visible; refreshing");
                        spawn_refresh(&inner);
                        next = Instant::now() + inner.cfg.interval;
                    }
                }
            }
        }
    }
    tracing::debug!(target: "feed::scheduler", "scheduler loop stopped");
}
