// src/config/feed.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

pub const DEFAULT_FEED_CONFIG_PATH: &str = "config/feed.toml";
pub const ENV_FEED_CONFIG_PATH: &str = "FEED_CONFIG_PATH";

fn default_ttl_secs() -> u64 {
    300
}
fn default_limit() -> usize {
    15
}
fn default_max_limit() -> usize {
    50
}
fn default_window_hours() -> u32 {
    6
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// "openai" | "mock" | "disabled" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Upper bound for `limit`; also bounds the number of cache keys.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// Seed for the fallback template rotation.
    #[serde(default)]
    pub fallback_seed: u64,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_ttl_secs(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            window_hours: default_window_hours(),
            fallback_seed: 0,
            generator: GeneratorConfig::default(),
        }
    }
}

impl FeedConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        let cfg: FeedConfig = toml::from_str(&data)
            .with_context(|| format!("parsing feed config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $FEED_CONFIG_PATH (must exist)
    /// 2) config/feed.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = env::var(ENV_FEED_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_FEED_CONFIG_PATH} points to non-existent path");
            }
            Self::load_from_file(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_FEED_CONFIG_PATH);
            if pb.exists() {
                Self::load_from_file(&pb)?
            } else {
                Self::default()
            }
        };
        cfg.with_env_overrides().resolve_api_key()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.timeout_secs)
    }

    /// Clamp a requested limit; zero or missing means the default.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) if n > 0 => n.min(self.max_limit),
            _ => self.default_limit,
        }
    }

    fn with_env_overrides(mut self) -> Self {
        fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }
        if let Some(v) = parse_env("FEED_CACHE_TTL_SECS") {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = parse_env("FEED_DEFAULT_LIMIT") {
            self.default_limit = v;
        }
        if let Some(v) = parse_env("FEED_MAX_LIMIT") {
            self.max_limit = v;
        }
        if let Some(v) = parse_env("FEED_WINDOW_HOURS") {
            self.window_hours = v;
        }
        if let Some(v) = parse_env("FEED_UPSTREAM_TIMEOUT_SECS") {
            self.generator.timeout_secs = v;
        }
        if let Ok(v) = env::var("FEED_GENERATOR") {
            self.generator.provider = v;
        }
        self.sanitized()
    }

    fn resolve_api_key(mut self) -> Result<Self> {
        if self.generator.provider == "openai"
            && self.generator.api_key.trim().eq_ignore_ascii_case("env")
        {
            self.generator.api_key = env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?;
        }
        Ok(self)
    }

    fn sanitized(mut self) -> Self {
        self.generator.provider = self.generator.provider.trim().to_ascii_lowercase();
        if self.cache_ttl_secs == 0 {
            self.cache_ttl_secs = default_ttl_secs();
        }
        if self.max_limit == 0 {
            self.max_limit = default_max_limit();
        }
        if self.default_limit == 0 {
            self.default_limit = default_limit();
        }
        if self.default_limit > self.max_limit {
            self.default_limit = self.max_limit;
        }
        if self.window_hours == 0 {
            self.window_hours = default_window_hours();
        }
        if self.generator.timeout_secs == 0 {
            self.generator.timeout_secs = default_timeout_secs();
        }
        self
    }
}
