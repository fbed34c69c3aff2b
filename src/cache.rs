//! # Feed cache
//! Key → entry map with TTL freshness and per-key single-flight generation.
//!
//! Concurrent misses for one key share a single generation: the first caller
//! runs the generator, everyone else arriving before it finishes awaits the
//! same result. Different keys never block each other; the map lock is only
//! held for bookkeeping, never across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::feed::types::{Category, ContentItem, FeedQuery};

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut g = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *g += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub category: Option<Category>,
    pub limit: usize,
}

impl CacheKey {
    pub fn new(category: Option<Category>, limit: usize) -> Self {
        Self { category, limit }
    }
}

impl From<&FeedQuery> for CacheKey {
    fn from(q: &FeedQuery) -> Self {
        Self::new(q.category, q.limit)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(c) => write!(f, "{c}:{}", self.limit),
            None => write!(f, "all:{}", self.limit),
        }
    }
}

/// Ranked items stored for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub items: Vec<ContentItem>,
    pub generated_at: DateTime<Utc>,
    pub is_real_time: bool,
}

/// What a generator hands back to the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub items: Vec<ContentItem>,
    pub is_real_time: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served a fresh stored entry.
    Hit,
    /// This caller ran the generator.
    Generated,
    /// Joined a generation started by another caller.
    Shared,
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: CacheEntry,
    pub outcome: CacheOutcome,
}

impl CacheLookup {
    /// True unless this very call produced the entry.
    pub fn cached(&self) -> bool {
        self.outcome != CacheOutcome::Generated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Empty,
    Fresh,
    Stale,
}

#[derive(Default)]
struct Flight {
    cell: tokio::sync::OnceCell<CacheEntry>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    inflight: HashMap<CacheKey, Arc<Flight>>,
}

pub struct CacheStore {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CacheStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation is a single map operation; a poisoned guard is still consistent.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match (self.clock.now() - entry.generated_at).to_std() {
            Ok(age) => age < self.ttl,
            // Generated "in the future" relative to the clock: treat as just made.
            Err(_) => true,
        }
    }

    /// Return the fresh entry for `key`, or generate one (single-flight per key).
    ///
    /// `force` skips the freshness check but still joins an in-progress generation.
    pub async fn get_or_generate<F, Fut>(&self, key: CacheKey, force: bool, generate: F) -> CacheLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Generated>,
    {
        let flight = {
            let mut g = self.lock();
            if !force {
                if let Some(e) = g.entries.get(&key).filter(|e| self.is_fresh(e)) {
                    counter!("feed_cache_hits_total").increment(1);
                    tracing::trace!(target: "feed::cache", %key, "hit");
                    return CacheLookup {
                        entry: e.clone(),
                        outcome: CacheOutcome::Hit,
                    };
                }
            }
            g.inflight.entry(key).or_default().clone()
        };

        let led = AtomicBool::new(false);
        let entry = flight
            .cell
            .get_or_init(|| {
                led.store(true, Ordering::Relaxed);
                let fut = generate();
                let clock = Arc::clone(&self.clock);
                async move {
                    let out = fut.await;
                    CacheEntry {
                        key,
                        items: out.items,
                        generated_at: clock.now(),
                        is_real_time: out.is_real_time,
                    }
                }
            })
            .await
            .clone();

        {
            let mut g = self.lock();
            // Only the flight still registered for the key may publish; an
            // invalidation while generating unregisters it.
            if g.inflight.get(&key).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
                g.inflight.remove(&key);
                g.entries.insert(key, entry.clone());
            }
        }

        let outcome = if led.load(Ordering::Relaxed) {
            counter!("feed_cache_misses_total").increment(1);
            tracing::debug!(target: "feed::cache", %key, force, items = entry.items.len(), "generated");
            CacheOutcome::Generated
        } else {
            counter!("feed_cache_shared_total").increment(1);
            tracing::debug!(target: "feed::cache", %key, "joined in-flight generation");
            CacheOutcome::Shared
        };
        CacheLookup { entry, outcome }
    }

    /// Drop one key (or every key when `None`). Returns how many entries were removed.
    pub fn invalidate(&self, key: Option<&CacheKey>) -> usize {
        let mut g = self.lock();
        let removed = match key {
            Some(k) => {
                g.inflight.remove(k);
                usize::from(g.entries.remove(k).is_some())
            }
            None => {
                g.inflight.clear();
                let n = g.entries.len();
                g.entries.clear();
                n
            }
        };
        counter!("feed_cache_invalidations_total").increment(1);
        tracing::info!(target: "feed::cache", key = ?key.map(|k| k.to_string()), removed, "invalidated");
        removed
    }

    pub fn state(&self, key: &CacheKey) -> KeyState {
        let g = self.lock();
        match g.entries.get(key) {
            None => KeyState::Empty,
            Some(e) if self.is_fresh(e) => KeyState::Fresh,
            Some(_) => KeyState::Stale,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fallback::FallbackPool;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn store() -> (Arc<CacheStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(CacheStore::new(Duration::from_secs(300), clock.clone()));
        (store, clock)
    }

    fn counting(calls: &Arc<AtomicUsize>) -> impl Future<Output = Generated> {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Generated {
                items: FallbackPool::default().generate_at(t0(), None, 3),
                is_real_time: true,
            }
        }
    }

    #[tokio::test]
    async fn fresh_entry_is_a_hit_then_stale_regenerates() {
        let (store, clock) = store();
        let key = CacheKey::new(None, 3);
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(store.state(&key), KeyState::Empty);
        let a = store.get_or_generate(key, false, || counting(&calls)).await;
        assert_eq!(a.outcome, CacheOutcome::Generated);
        assert!(!a.cached());
        assert_eq!(store.state(&key), KeyState::Fresh);

        clock.advance(chrono::Duration::seconds(299));
        let b = store.get_or_generate(key, false, || counting(&calls)).await;
        assert_eq!(b.outcome, CacheOutcome::Hit);
        assert_eq!(a.entry, b.entry);

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(store.state(&key), KeyState::Stale);
        let c = store.get_or_generate(key, false, || counting(&calls)).await;
        assert_eq!(c.outcome, CacheOutcome::Generated);
        assert_eq!(c.entry.generated_at, t0() + chrono::Duration::seconds(300));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn force_and_invalidate_regenerate() {
        let (store, _clock) = store();
        let key = CacheKey::new(Some(Category::Economy), 5);
        let calls = Arc::new(AtomicUsize::new(0));

        store.get_or_generate(key, false, || counting(&calls)).await;
        let forced = store.get_or_generate(key, true, || counting(&calls)).await;
        assert_eq!(forced.outcome, CacheOutcome::Generated);

        assert_eq!(store.invalidate(Some(&key)), 1);
        assert_eq!(store.state(&key), KeyState::Empty);
        let after = store.get_or_generate(key, false, || counting(&calls)).await;
        assert_eq!(after.outcome, CacheOutcome::Generated);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let other = CacheKey::new(None, 5);
        store.get_or_generate(other, false, || counting(&calls)).await;
        assert_eq!(store.invalidate(None), 2);
        assert!(store.is_empty());
    }

    fn slow(calls: &Arc<AtomicUsize>) -> impl Future<Output = Generated> {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Generated {
                items: FallbackPool::default().generate_at(t0(), None, 2),
                is_real_time: false,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_generation() {
        let (store, _clock) = store();
        let key = CacheKey::new(None, 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                // Half of the callers force; they still join the same flight.
                tokio::spawn(async move {
                    store
                        .get_or_generate(key, i % 2 == 0, || slow(&calls))
                        .await
                })
            })
            .collect();

        let mut generated = 0;
        let mut first: Option<CacheEntry> = None;
        for h in handles {
            let r = h.await.unwrap();
            if r.outcome == CacheOutcome::Generated {
                generated += 1;
            }
            match &first {
                None => first = Some(r.entry),
                Some(e) => assert_eq!(e, &r.entry),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(generated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_generate_in_parallel() {
        let (store, _clock) = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();

        let (a, b) = tokio::join!(
            store.get_or_generate(CacheKey::new(None, 1), false, || slow(&calls)),
            store.get_or_generate(CacheKey::new(Some(Category::Culture), 1), false, || slow(&calls)),
        );
        assert_eq!(a.outcome, CacheOutcome::Generated);
        assert_eq!(b.outcome, CacheOutcome::Generated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_generation_is_not_overwritten() {
        let (store, _clock) = store();
        let key = CacheKey::new(None, 4);
        let calls = Arc::new(AtomicUsize::new(0));

        let pending = {
            let store = Arc::clone(&store);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { store.get_or_generate(key, false, || slow(&calls)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.invalidate(None);
        let r = pending.await.unwrap();
        assert_eq!(r.outcome, CacheOutcome::Generated);
        assert_eq!(store.state(&key), KeyState::Empty);

        let again = store.get_or_generate(key, false, || slow(&calls)).await;
        assert_eq!(again.outcome, CacheOutcome::Generated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn key_display() {
        assert_eq!(CacheKey::new(None, 15).to_string(), "all:15");
        assert_eq!(
            CacheKey::new(Some(Category::Technology), 3).to_string(),
            "technology:3"
        );
    }
}
