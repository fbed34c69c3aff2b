// src/config/mod.rs
pub mod feed;

pub use feed::{FeedConfig, GeneratorConfig, DEFAULT_FEED_CONFIG_PATH, ENV_FEED_CONFIG_PATH};
