//! Upstream generator adapter: provider abstraction, payload repair and normalization.
//!
//! The external generator is asked for a JSON list of items. Whatever comes back is
//! unwrapped from code fences, parsed, repaired field by field and turned into
//! [`ContentItem`]s. Anything that prevents a usable list is a [`GenerationError`];
//! callers substitute the fallback pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::types::{Category, ContentItem, Sentiment};
use crate::config::GeneratorConfig;

const PLACEHOLDER_TITLE: &str = "Untitled update";
const DEFAULT_SOURCE: &str = "Newsroom";
const DEFAULT_REGION: &str = "national";
const TITLE_MAX_CHARS: usize = 200;
const BODY_MAX_CHARS: usize = 1500;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generator transport failed: {0}")]
    Transport(String),
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
    #[error("generator payload malformed: {0}")]
    Malformed(String),
    #[error("generator returned no usable items")]
    Empty,
}

/// What the generator is asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub categories: Vec<Category>,
    pub window_hours: u32,
    pub now: DateTime<Utc>,
}

impl GenerationRequest {
    pub fn new(category: Option<Category>, window_hours: u32, now: DateTime<Utc>) -> Self {
        let categories = match category {
            Some(c) => vec![c],
            None => Category::ALL.to_vec(),
        };
        Self {
            categories,
            window_hours,
            now,
        }
    }

    /// Instruction text sent to a model-backed generator.
    pub fn prompt(&self) -> String {
        let cats = self
            .categories
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Current time: {now}. Produce 15-20 news items published within the last {hours} hours.\n\
             Allowed categories: {cats}.\n\
             Return ONLY a JSON array. Each element must have: \
             \"title\" (string), \"body\" (2-3 sentences), \"sourceName\" (string), \
             \"publishedAt\" (RFC 3339), \"sentiment\" (positive|negative|neutral), \
             \"category\" (one of the allowed categories), \"relevanceScore\" (integer 0-100), \
             \"verified\" (boolean), \"region\" (string). No commentary, no markdown.",
            now = self.now.to_rfc3339(),
            hours = self.window_hours,
        )
    }
}

/// Low-level generator: performs the remote call and returns its raw text body.
#[async_trait::async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> anyhow::Result<String>;
    fn name(&self) -> &'static str;
}

pub type DynGenerator = Arc<dyn ContentGenerator>;

/// Factory: build a generator according to config and environment.
///
/// * `FEED_TEST_MODE=mock` forces the static mock generator.
/// * `provider = "openai"` builds the chat-completions client.
/// * anything else is disabled (every call fails, so the fallback pool is served).
pub fn build_generator_from_config(cfg: &GeneratorConfig) -> DynGenerator {
    if std::env::var("FEED_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(StaticGenerator::sample());
    }

    match cfg.provider.as_str() {
        "openai" => match OpenAiGenerator::new(&cfg.api_key, &cfg.model) {
            Ok(g) => Arc::new(g),
            Err(e) => {
                tracing::warn!(target: "feed::upstream", error = ?e, "openai generator unavailable; using fallback only");
                Arc::new(DisabledGenerator)
            }
        },
        "mock" => Arc::new(StaticGenerator::sample()),
        _ => Arc::new(DisabledGenerator),
    }
}

/// OpenAI chat-completions generator.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: &str, model: &str) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("missing OpenAI api key");
        }
        // The adapter enforces the overall deadline; this only bounds connect.
        let http = reqwest::Client::builder()
            .user_agent("feed-sync/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, req: &GenerationRequest) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You are a news desk assistant. Reply with a JSON array only.";
        let prompt = req.prompt();
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("openai returned status {status}");
        }
        let parsed: Resp = resp.json().await.context("openai response body")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("openai returned no choices"))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; used when no generator is configured.
pub struct DisabledGenerator;

#[async_trait::async_trait]
impl ContentGenerator for DisabledGenerator {
    async fn generate(&self, _req: &GenerationRequest) -> anyhow::Result<String> {
        anyhow::bail!("content generator disabled")
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns a fixed body; for local runs and tests.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    pub body: String,
}

impl StaticGenerator {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// A small fenced payload spanning every category.
    pub fn sample() -> Self {
        Self::new(
            r#"```json
[
  {"title": "Parliament passes data protection amendment", "body": "The bill tightens consent rules for personal data.", "sourceName": "Capital Press", "sentiment": "neutral", "category": "politics", "relevanceScore": 88, "verified": true, "region": "national"},
  {"title": "Consumer prices rise 2.1% year on year", "body": "Food and energy drove the increase.", "sourceName": "Market Wire", "sentiment": "negative", "category": "economy", "relevanceScore": 91, "verified": true, "region": "national"},
  {"title": "Volunteers clean up coastal trails", "body": "Hundreds joined the weekend drive.", "sourceName": "Metro Herald", "sentiment": "positive", "category": "social", "relevanceScore": 74, "verified": false, "region": "east"},
  {"title": "Startup ships open-source speech model", "body": "The model runs on consumer laptops.", "sourceName": "Tech Review", "sentiment": "positive", "category": "technology", "relevanceScore": 83, "verified": true, "region": "national"},
  {"title": "Orchestra announces free summer concerts", "body": "Six open-air shows are planned.", "sourceName": "Arts Weekly", "sentiment": "positive", "category": "culture", "verified": true, "region": "capital"}
]
```"#,
        )
    }
}

#[async_trait::async_trait]
impl ContentGenerator for StaticGenerator {
    async fn generate(&self, _req: &GenerationRequest) -> anyhow::Result<String> {
        Ok(self.body.clone())
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

/// Wraps a generator with a deadline, payload repair and item normalization.
pub struct GeneratorAdapter {
    generator: DynGenerator,
    timeout: Duration,
    seq: AtomicU64,
}

impl GeneratorAdapter {
    pub fn new(generator: DynGenerator, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            seq: AtomicU64::new(0),
        }
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub async fn fetch(
        &self,
        category: Option<Category>,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, GenerationError> {
        let req = GenerationRequest::new(category, window_hours, now);
        let raw = match tokio::time::timeout(self.timeout, self.generator.generate(&req)).await {
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(GenerationError::Transport(format!("{e:#}"))),
            Ok(Ok(body)) => body,
        };

        let elements = parse_payload(&raw)?;
        let items: Vec<ContentItem> = elements
            .iter()
            .enumerate()
            .filter_map(|(i, v)| match v.as_object() {
                Some(obj) => Some(self.normalize(obj, i, category, now)),
                None => {
                    tracing::debug!(target: "feed::upstream", index = i, "skipping non-object element");
                    None
                }
            })
            .collect();

        if items.is_empty() {
            return Err(GenerationError::Empty);
        }
        tracing::debug!(
            target: "feed::upstream",
            generator = self.generator.name(),
            count = items.len(),
            "generated items"
        );
        Ok(items)
    }

    fn normalize(
        &self,
        obj: &Map<String, Value>,
        index: usize,
        requested: Option<Category>,
        now: DateTime<Utc>,
    ) -> ContentItem {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("rt-{}-{seq}", now.timestamp_millis());

        let title = str_field(obj, &["title", "headline"])
            .map(|s| clean_text(s, TITLE_MAX_CHARS))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
        let body = str_field(obj, &["body", "content", "summary", "description"])
            .map(|s| clean_text(s, BODY_MAX_CHARS))
            .unwrap_or_default();
        let source_name = str_field(obj, &["sourceName", "source_name", "source"])
            .map(|s| clean_text(s, 80))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        let category = str_field(obj, &["category"])
            .and_then(Category::parse_lenient)
            .or(requested)
            .unwrap_or(Category::Social);
        let sentiment = str_field(obj, &["sentiment"])
            .map(Sentiment::parse_lenient)
            .unwrap_or_default();
        let relevance_score = score_field(obj, &["relevanceScore", "relevance_score", "score"])
            .unwrap_or_else(|| default_score(&title));
        let verified = obj
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let region = str_field(obj, &["region"])
            .map(|s| clean_text(s, 60))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        // Missing or future timestamps are spread backwards from now.
        let published_at = str_field(obj, &["publishedAt", "published_at", "date"])
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .filter(|d| *d <= now)
            .unwrap_or_else(|| now - ChronoDuration::minutes(index as i64 * 10));

        let url = derive_url(&source_name, &title, &id);
        let image_url = str_field(obj, &["imageUrl", "image_url"])
            .filter(|s| s.starts_with("http"))
            .map(str::to_string)
            .or_else(|| Some(format!("https://placehold.co/640x360?text={category}")));

        ContentItem {
            id,
            title,
            body,
            source_name,
            url,
            published_at,
            sentiment,
            category,
            relevance_score,
            verified,
            region,
            image_url,
        }
    }
}

/// Remove markdown code fences and any prose around the JSON payload.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (e.g. "json") on the opening fence line.
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        s = s.trim_end();
        s = s.strip_suffix("```").unwrap_or(s).trim();
    }
    if s.starts_with('[') || s.starts_with('{') {
        return s;
    }
    let start = s.find(['[', '{']);
    let end = s.rfind([']', '}']);
    match (start, end) {
        (Some(a), Some(b)) if a < b => &s[a..=b],
        _ => s,
    }
}

/// Parse the stripped payload into a list of elements.
/// Accepts a bare array or an object wrapping one under `items`/`news`.
pub fn parse_payload(raw: &str) -> Result<Vec<Value>, GenerationError> {
    let body = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    match value {
        Value::Array(v) => Ok(v),
        Value::Object(mut obj) => ["items", "news"]
            .iter()
            .find_map(|k| match obj.remove(*k) {
                Some(Value::Array(v)) => Some(v),
                _ => None,
            })
            .ok_or_else(|| GenerationError::Malformed("expected a JSON array".into())),
        _ => Err(GenerationError::Malformed("expected a JSON array".into())),
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn score_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u8> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        let n = v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
        n.is_finite().then(|| n.round().clamp(0.0, 100.0) as u8)
    })
}

/// Stable score in 70..=95 for items the generator left unscored.
fn default_score(title: &str) -> u8 {
    let digest = Sha256::digest(title.as_bytes());
    70 + digest[0] % 26
}

/// Deterministic article URL from source, title and id.
pub fn derive_url(source: &str, title: &str, id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    let mut hash = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut hash, "{:02x}", b);
    }
    let slug: String = source
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "news" } else { slug };
    format!("https://news.example.com/{slug}/{hash}")
}

/// Decode entities, strip tags, collapse whitespace and cap length.
pub fn clean_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Option<Regex>> = OnceCell::new();
    if let Some(re) = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").ok()) {
        out = re.replace_all(&out, "").to_string();
    }

    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}
