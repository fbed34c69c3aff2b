//! Sync service: cache → generator adapter (→ fallback) → ranking → response.
//!
//! `get_feed` never fails. Generation errors are logged and replaced by
//! fallback items marked `is_real_time = false`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, CacheStore, Clock, Generated, SystemClock};
use crate::config::FeedConfig;
use crate::feed::fallback::FallbackPool;
use crate::feed::rank::rank;
use crate::feed::types::{distinct_sources, Category, ContentItem, FeedQuery};
use crate::feed::upstream::{build_generator_from_config, DynGenerator, GeneratorAdapter};
use crate::sentiment::SentimentStats;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_cache_hits_total", "Reads served from a fresh cache entry.");
        describe_counter!("feed_cache_misses_total", "Reads that ran a generation.");
        describe_counter!(
            "feed_cache_shared_total",
            "Reads that joined an in-flight generation."
        );
        describe_counter!("feed_cache_invalidations_total", "Cache invalidation calls.");
        describe_counter!(
            "feed_generation_failures_total",
            "Upstream generation failures replaced by fallback items."
        );
        describe_counter!(
            "feed_fallback_served_total",
            "Generations that stored fallback items."
        );
        describe_histogram!("feed_generation_ms", "Generation time in milliseconds.");
        describe_gauge!("feed_cache_ttl_secs", "Configured cache TTL in seconds.");
    });
}

/// Body of `GET /feed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub success: bool,
    pub items: Vec<ContentItem>,
    pub total_count: usize,
    pub last_updated: DateTime<Utc>,
    pub sources: Vec<String>,
    pub is_real_time: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub sentiment_stats: SentimentStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedResponse {
    fn from_items(
        items: Vec<ContentItem>,
        last_updated: DateTime<Utc>,
        is_real_time: bool,
        cached: bool,
    ) -> Self {
        Self {
            success: true,
            total_count: items.len(),
            sources: distinct_sources(&items),
            sentiment_stats: SentimentStats::from_items(&items),
            items,
            last_updated,
            is_real_time,
            cached,
            error: None,
        }
    }
}

pub struct SyncService {
    cfg: FeedConfig,
    cache: CacheStore,
    adapter: GeneratorAdapter,
    fallback: FallbackPool,
}

impl SyncService {
    pub fn new(cfg: FeedConfig, generator: DynGenerator, clock: Arc<dyn Clock>) -> Self {
        ensure_metrics_described();
        gauge!("feed_cache_ttl_secs").set(cfg.cache_ttl_secs as f64);
        Self {
            cache: CacheStore::new(cfg.ttl(), clock),
            adapter: GeneratorAdapter::new(generator, cfg.upstream_timeout()),
            fallback: FallbackPool::with_seed(cfg.fallback_seed),
            cfg,
        }
    }

    /// Production wiring: generator from config, wall clock.
    pub fn from_config(cfg: FeedConfig) -> Self {
        let generator = build_generator_from_config(&cfg.generator);
        tracing::info!(
            target: "feed::sync",
            generator = generator.name(),
            ttl_secs = cfg.cache_ttl_secs,
            window_hours = cfg.window_hours,
            "sync service ready"
        );
        Self::new(cfg, generator, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &FeedConfig {
        &self.cfg
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Build a query with the limit clamped to the configured bounds.
    pub fn query(&self, category: Option<Category>, limit: Option<usize>, force: bool) -> FeedQuery {
        FeedQuery {
            category,
            limit: self.cfg.effective_limit(limit),
            force_refresh: force,
        }
    }

    pub async fn get_feed(&self, q: FeedQuery) -> FeedResponse {
        let limit = self.cfg.effective_limit(Some(q.limit));
        let category = q.category;
        let key = CacheKey::new(category, limit);

        let adapter = &self.adapter;
        let fallback = &self.fallback;
        let clock = Arc::clone(self.cache.clock());
        let window_hours = self.cfg.window_hours;

        let lookup = self
            .cache
            .get_or_generate(key, q.force_refresh, || async move {
                let started = Instant::now();
                let now = clock.now();
                let (candidates, mut real_time) =
                    match adapter.fetch(category, window_hours, now).await {
                        Ok(items) => (items, true),
                        Err(e) => {
                            counter!("feed_generation_failures_total").increment(1);
                            tracing::warn!(
                                target: "feed::sync",
                                %key,
                                generator = adapter.generator_name(),
                                error = %e,
                                "generation failed; serving fallback"
                            );
                            (Vec::new(), false)
                        }
                    };

                let mut items = rank(candidates, category, limit);
                if items.is_empty() {
                    if real_time {
                        tracing::warn!(target: "feed::sync", %key, "no generated items matched; serving fallback");
                    }
                    counter!("feed_fallback_served_total").increment(1);
                    items = rank(fallback.generate_at(now, category, limit), category, limit);
                    real_time = false;
                }

                histogram!("feed_generation_ms").record(started.elapsed().as_secs_f64() * 1000.0);
                Generated {
                    items,
                    is_real_time: real_time,
                }
            })
            .await;

        let cached = lookup.cached();
        let entry = lookup.entry;
        FeedResponse::from_items(entry.items, entry.generated_at, entry.is_real_time, cached)
    }

    /// Fallback-only answer, used when the normal path could not run at all.
    pub fn fallback_response(&self, q: FeedQuery, error: impl Into<String>) -> FeedResponse {
        let limit = self.cfg.effective_limit(Some(q.limit));
        let now = self.cache.clock().now();
        let items = rank(self.fallback.generate_at(now, q.category, limit), q.category, limit);
        let mut resp = FeedResponse::from_items(items, now, false, false);
        resp.error = Some(error.into());
        resp
    }

    /// Invalidate every key; the next read regenerates.
    pub fn clear_cache(&self) -> usize {
        self.cache.invalidate(None)
    }
}
