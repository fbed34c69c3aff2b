// src/feed/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic buckets the generator and the fallback pool are allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Economy,
    Social,
    Technology,
    Culture,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Politics,
        Category::Economy,
        Category::Social,
        Category::Technology,
        Category::Culture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Economy => "economy",
            Category::Social => "social",
            Category::Technology => "technology",
            Category::Culture => "culture",
        }
    }

    /// Lenient label matching for generator output (case-insensitive, common aliases).
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "politics" | "political" | "politic" => Some(Category::Politics),
            "economy" | "economic" | "economics" => Some(Category::Economy),
            "social" | "society" => Some(Category::Social),
            "technology" | "tech" => Some(Category::Technology),
            "culture" | "cultural" | "arts" | "culture/arts" => Some(Category::Culture),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse_lenient(s).ok_or_else(|| anyhow::anyhow!("unknown category: {s}"))
    }
}

/// Opaque sentiment label attached by the generator or the fallback templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Unknown labels map to `Neutral`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "good" => Sentiment::Positive,
            "negative" | "neg" | "bad" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

/// One ranked news item as served by `GET /feed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub source_name: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub category: Category,
    /// Always within 0..=100.
    pub relevance_score: u8,
    pub verified: bool,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

pub const DEFAULT_LIMIT: usize = 15;

/// Parsed read request. `category == None` means "all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub category: Option<Category>,
    pub limit: usize,
    pub force_refresh: bool,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: DEFAULT_LIMIT,
            force_refresh: false,
        }
    }
}

impl FeedQuery {
    pub fn new(category: Option<Category>, limit: usize) -> Self {
        Self {
            category,
            limit,
            force_refresh: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Category as used in URLs and cache keys.
    pub fn category_label(&self) -> &'static str {
        self.category.map(|c| c.as_str()).unwrap_or("all")
    }
}

/// Distinct source names in first-seen order.
pub fn distinct_sources(items: &[ContentItem]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in items {
        if !out.iter().any(|s| s == &it.source_name) {
            out.push(it.source_name.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_aliases_and_case() {
        assert_eq!(Category::parse_lenient("Tech"), Some(Category::Technology));
        assert_eq!(Category::parse_lenient(" SOCIETY "), Some(Category::Social));
        assert_eq!(Category::parse_lenient("sports"), None);
        assert_eq!(Category::parse_lenient("science"), None);
        assert_eq!(Category::parse_lenient("business"), None);
        assert!("all".parse::<Category>().is_err());
    }

    #[test]
    fn unknown_sentiment_is_neutral() {
        assert_eq!(Sentiment::parse_lenient("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::parse_lenient("mixed"), Sentiment::Neutral);
    }

    #[test]
    fn item_serializes_camel_case() {
        let it = ContentItem {
            id: "a".into(),
            title: "t".into(),
            body: "b".into(),
            source_name: "Wire".into(),
            url: "https://example.com".into(),
            published_at: Utc::now(),
            sentiment: Sentiment::Neutral,
            category: Category::Economy,
            relevance_score: 80,
            verified: true,
            region: "national".into(),
            image_url: None,
        };
        let v = serde_json::to_value(&it).unwrap();
        assert!(v.get("sourceName").is_some());
        assert!(v.get("relevanceScore").is_some());
        assert_eq!(v["category"], "economy");
        assert!(v.get("imageUrl").is_none());
    }
}
