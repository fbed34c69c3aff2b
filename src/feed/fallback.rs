//! # Fallback Pool
//! Synthetic, always-available items served whenever the upstream generator
//! fails or yields nothing usable.
//!
//! Output depends only on the template set, the rotation counter and the
//! timestamp passed in; there is no unseeded randomness.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::types::{Category, ContentItem, Sentiment};

#[derive(Debug, Clone)]
struct Template {
    title: &'static str,
    body: &'static str,
    source: &'static str,
    category: Category,
    sentiment: Sentiment,
    score: u8,
    region: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        title: "National assembly opens debate on next year's budget",
        body: "Lawmakers began reviewing the government's spending plan, with committee hearings scheduled through the end of the month.",
        source: "Capital Press",
        category: Category::Politics,
        sentiment: Sentiment::Neutral,
        score: 88,
        region: "national",
    },
    Template {
        title: "Cross-party group agrees on election reform roadmap",
        body: "Negotiators from the main parties announced a joint timetable for revising district boundaries before the next general election.",
        source: "Daily Ledger",
        category: Category::Politics,
        sentiment: Sentiment::Positive,
        score: 82,
        region: "national",
    },
    Template {
        title: "Central bank holds benchmark rate steady",
        body: "The monetary policy board kept its key rate unchanged, citing easing inflation and a cautious outlook for exports.",
        source: "Market Wire",
        category: Category::Economy,
        sentiment: Sentiment::Neutral,
        score: 92,
        region: "national",
    },
    Template {
        title: "Exports fall for a second straight month",
        body: "Weaker semiconductor demand weighed on outbound shipments, widening the trade deficit compared with a year earlier.",
        source: "Business Today",
        category: Category::Economy,
        sentiment: Sentiment::Negative,
        score: 85,
        region: "national",
    },
    Template {
        title: "City expands late-night public transit routes",
        body: "Three new night bus lines will connect outer districts with the downtown core starting next week.",
        source: "Metro Herald",
        category: Category::Social,
        sentiment: Sentiment::Positive,
        score: 76,
        region: "capital",
    },
    Template {
        title: "Heavy rain warning issued for southern provinces",
        body: "Forecasters expect up to 150mm of rainfall overnight and urged residents near rivers to prepare for possible evacuation.",
        source: "Weather Desk",
        category: Category::Social,
        sentiment: Sentiment::Negative,
        score: 90,
        region: "south",
    },
    Template {
        title: "Domestic chipmaker unveils next-generation memory",
        body: "The company said mass production of the new high-bandwidth modules will begin in the second half of the year.",
        source: "Tech Review",
        category: Category::Technology,
        sentiment: Sentiment::Positive,
        score: 87,
        region: "national",
    },
    Template {
        title: "Regulator opens consultation on AI safety guidelines",
        body: "The draft rules would require disclosure of training data sources for large models deployed in public services.",
        source: "Digital Times",
        category: Category::Technology,
        sentiment: Sentiment::Neutral,
        score: 79,
        region: "national",
    },
    Template {
        title: "National museum extends hours for autumn exhibition",
        body: "Visitors will be able to tour the ceramics retrospective until 9pm on weekends through November.",
        source: "Arts Weekly",
        category: Category::Culture,
        sentiment: Sentiment::Positive,
        score: 72,
        region: "capital",
    },
    Template {
        title: "Film festival announces opening-night lineup",
        body: "Organizers revealed twelve world premieres, with screenings spread across five venues in the harbor district.",
        source: "Culture Column",
        category: Category::Culture,
        sentiment: Sentiment::Neutral,
        score: 74,
        region: "east",
    },
];

/// Deterministic synthetic item source.
#[derive(Debug)]
pub struct FallbackPool {
    seed: u64,
    counter: AtomicU64,
}

impl Default for FallbackPool {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl FallbackPool {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }

    /// At least `min_count` verified items across all categories, stamped relative to now.
    pub fn generate(&self, min_count: usize) -> Vec<ContentItem> {
        self.generate_at(Utc::now(), None, min_count)
    }

    /// Like [`generate`](Self::generate) but limited to one category when given.
    pub fn generate_for(&self, category: Option<Category>, min_count: usize) -> Vec<ContentItem> {
        self.generate_at(Utc::now(), category, min_count)
    }

    pub fn generate_at(
        &self,
        now: DateTime<Utc>,
        category: Option<Category>,
        min_count: usize,
    ) -> Vec<ContentItem> {
        let pool: Vec<&Template> = TEMPLATES
            .iter()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .collect();
        // Never fewer than one full pass over the selected templates.
        let count = min_count.max(1).max(pool.len());
        // Reduced before indexing so `rotation + i` cannot overflow for any seed.
        // Every per-category pool size divides TEMPLATES.len().
        let rotation = (self
            .seed
            .wrapping_add(self.counter.fetch_add(1, Ordering::Relaxed))
            % TEMPLATES.len() as u64) as usize;
        let stamp = now.timestamp_millis();

        (0..count)
            .map(|i| {
                let tpl = pool[(rotation + i) % pool.len()];
                let cycle = i / pool.len();
                let title = if cycle == 0 {
                    tpl.title.to_string()
                } else {
                    format!("{} (update {})", tpl.title, cycle)
                };
                // Spread over the last ~5 hours.
                let age_min = 5 + (i as i64 * 23) % 290;
                let id = format!("fallback-{stamp}-{i}");
                ContentItem {
                    url: format!(
                        "https://news.example.com/{}/fallback-{}",
                        tpl.category,
                        (rotation + i) % TEMPLATES.len()
                    ),
                    image_url: Some(format!(
                        "https://placehold.co/640x360?text={}",
                        tpl.category
                    )),
                    id,
                    title,
                    body: tpl.body.to_string(),
                    source_name: tpl.source.to_string(),
                    published_at: now - ChronoDuration::minutes(age_min),
                    sentiment: tpl.sentiment,
                    category: tpl.category,
                    relevance_score: tpl.score,
                    verified: true,
                    region: tpl.region.to_string(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn always_returns_at_least_min_count_verified() {
        let pool = FallbackPool::default();
        for n in [0usize, 1, 7, 15, 40] {
            let items = pool.generate_at(t0(), None, n);
            assert!(items.len() >= n.max(1));
            assert!(items.iter().all(|it| it.verified));
            let ids: HashSet<_> = items.iter().map(|i| i.id.clone()).collect();
            assert_eq!(ids.len(), items.len(), "ids must be unique");
        }
    }

    #[test]
    fn category_restricted_output() {
        let pool = FallbackPool::default();
        let items = pool.generate_at(t0(), Some(Category::Technology), 5);
        assert!(items.len() >= 5);
        assert!(items.iter().all(|i| i.category == Category::Technology));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = FallbackPool::with_seed(3);
        let b = FallbackPool::with_seed(3);
        let xa = a.generate_at(t0(), None, 10);
        let xb = b.generate_at(t0(), None, 10);
        assert_eq!(xa, xb);
        // Counter advances the rotation on each call.
        let next = a.generate_at(t0(), None, 10);
        assert_ne!(xa[0].title, next[0].title);
    }

    #[test]
    fn extreme_seeds_do_not_overflow() {
        for seed in [u64::MAX, u64::MAX - 1, u64::MAX - 7] {
            let pool = FallbackPool::with_seed(seed);
            for _ in 0..3 {
                let items = pool.generate_at(t0(), None, 25);
                assert_eq!(items.len(), 25);
                let one = pool.generate_at(t0(), Some(Category::Economy), 3);
                assert!(one.iter().all(|i| i.category == Category::Economy));
            }
        }
    }

    #[test]
    fn published_within_last_hours() {
        let items = FallbackPool::default().generate_at(t0(), None, 30);
        for it in items {
            let age = t0() - it.published_at;
            assert!(age > ChronoDuration::zero());
            assert!(age <= ChronoDuration::hours(5));
        }
    }
}
