use serde::{Deserialize, Serialize};

use crate::feed::types::{ContentItem, Sentiment};

/// Label counts over a served item list, for the dashboard's mood gauge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentStats {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub total: usize,
}

impl SentimentStats {
    pub fn from_items(items: &[ContentItem]) -> Self {
        let mut s = Self::default();
        for it in items {
            match it.sentiment {
                Sentiment::Positive => s.positive += 1,
                Sentiment::Negative => s.negative += 1,
                Sentiment::Neutral => s.neutral += 1,
            }
        }
        s.total = items.len();
        s
    }

    /// Rounded share of `label` in percent (0 when empty).
    pub fn percent(&self, label: Sentiment) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let n = match label {
            Sentiment::Positive => self.positive,
            Sentiment::Negative => self.negative,
            Sentiment::Neutral => self.neutral,
        };
        ((n as f64 / self.total as f64) * 100.0).round() as u8
    }

    /// The most frequent label; ties resolve to neutral.
    pub fn dominant(&self) -> Sentiment {
        if self.positive > self.negative && self.positive > self.neutral {
            Sentiment::Positive
        } else if self.negative > self.positive && self.negative > self.neutral {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fallback::FallbackPool;

    #[test]
    fn counts_add_up() {
        let items = FallbackPool::default().generate(10);
        let s = SentimentStats::from_items(&items);
        assert_eq!(s.total, items.len());
        assert_eq!(s.positive + s.negative + s.neutral, s.total);
    }

    #[test]
    fn percent_and_dominant() {
        let s = SentimentStats {
            positive: 1,
            negative: 2,
            neutral: 0,
            total: 3,
        };
        assert_eq!(s.percent(Sentiment::Negative), 67);
        assert_eq!(s.dominant(), Sentiment::Negative);
        assert_eq!(SentimentStats::default().percent(Sentiment::Positive), 0);
        assert_eq!(SentimentStats::default().dominant(), Sentiment::Neutral);
    }
}
