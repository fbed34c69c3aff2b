// src/feed/mod.rs
//! Content pipeline: item model, upstream adapter, fallback pool, ranking.

pub mod fallback;
pub mod rank;
pub mod types;
pub mod upstream;

pub use fallback::FallbackPool;
pub use rank::rank;
pub use types::{Category, ContentItem, FeedQuery, Sentiment};
pub use upstream::{ContentGenerator, GenerationError, GeneratorAdapter};
