// src/feed/rank.rs
//! Category filter + deterministic ordering + truncation.
//!
//! score = relevance * 0.7 + recency * 0.3, where recency is the item's
//! publish time scaled to 0..=100 across the candidate set (newest = 100).
//! Sorting is stable, so equal scores keep their input order.

use super::types::{Category, ContentItem};

const RELEVANCE_WEIGHT: f64 = 0.7;
const RECENCY_WEIGHT: f64 = 0.3;

/// Filter by category (None = all), sort by blended score, truncate to `limit`.
pub fn rank(items: Vec<ContentItem>, category: Option<Category>, limit: usize) -> Vec<ContentItem> {
    let filtered: Vec<ContentItem> = match category {
        Some(c) => items.into_iter().filter(|it| it.category == c).collect(),
        None => items,
    };

    let scores = score_items(&filtered);
    let mut indexed: Vec<(f64, ContentItem)> = scores.into_iter().zip(filtered).collect();
    // `sort_by` is stable: ties keep input order.
    indexed.sort_by(|a, b| b.0.total_cmp(&a.0));

    indexed
        .into_iter()
        .take(limit)
        .map(|(_, it)| it)
        .collect()
}

/// Blended score per item, in input order.
pub fn score_items(items: &[ContentItem]) -> Vec<f64> {
    let Some(newest) = items.iter().map(|i| i.published_at.timestamp_millis()).max() else {
        return Vec::new();
    };
    let oldest = items
        .iter()
        .map(|i| i.published_at.timestamp_millis())
        .min()
        .unwrap_or(newest);
    let span = (newest - oldest) as f64;

    items
        .iter()
        .map(|it| {
            let recency = if span <= 0.0 {
                100.0
            } else {
                (it.published_at.timestamp_millis() - oldest) as f64 / span * 100.0
            };
            f64::from(it.relevance_score.min(100)) * RELEVANCE_WEIGHT + recency * RECENCY_WEIGHT
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Sentiment;
    use chrono::{Duration, TimeZone, Utc};

    fn item(id: &str, cat: Category, score: u8, age_min: i64) -> ContentItem {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        ContentItem {
            id: id.into(),
            title: format!("title {id}"),
            body: String::new(),
            source_name: "Wire".into(),
            url: format!("https://example.com/{id}"),
            published_at: now - Duration::minutes(age_min),
            sentiment: Sentiment::Neutral,
            category: cat,
            relevance_score: score,
            verified: true,
            region: "national".into(),
            image_url: None,
        }
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn filters_category_and_truncates() {
        let items = vec![
            item("a", Category::Economy, 90, 10),
            item("b", Category::Technology, 80, 20),
            item("c", Category::Technology, 95, 10),
            item("d", Category::Technology, 70, 30),
        ];
        let out = rank(items, Some(Category::Technology), 2);
        assert_eq!(ids(&out), vec!["c", "b"]);
    }

    #[test]
    fn scores_are_non_increasing() {
        let items: Vec<_> = (0..12)
            .map(|i| item(&format!("x{i}"), Category::Social, (60 + i * 3) as u8, i as i64 * 13))
            .collect();
        let out = rank(items, None, 50);
        let s = score_items(&out);
        assert!(s.windows(2).all(|w| w[0] >= w[1]), "{s:?}");
    }

    #[test]
    fn rank_is_idempotent_on_sorted_full_set() {
        let items = vec![
            item("a", Category::Culture, 80, 0),
            item("b", Category::Politics, 80, 0),
            item("c", Category::Economy, 75, 60),
            item("d", Category::Economy, 75, 60),
        ];
        let once = rank(items, None, 15);
        let twice = rank(once.clone(), None, 15);
        assert_eq!(ids(&once), ids(&twice));
        // Equal scores keep input order.
        assert_eq!(ids(&once), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(rank(Vec::new(), Some(Category::Culture), 5).is_empty());
    }
}
