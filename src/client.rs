// src/client.rs
//! Transports a [`FeedScheduler`](crate::scheduler::FeedScheduler) can poll:
//! a remote service over HTTP, or a [`SyncService`] in the same process.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::feed::types::FeedQuery;
use crate::sync::{FeedResponse, SyncService};

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, query: &FeedQuery) -> Result<FeedResponse>;
    async fn clear_cache(&self) -> Result<()>;
}

#[async_trait::async_trait]
impl FeedSource for SyncService {
    async fn fetch(&self, query: &FeedQuery) -> Result<FeedResponse> {
        Ok(self.get_feed(*query).await)
    }

    async fn clear_cache(&self) -> Result<()> {
        SyncService::clear_cache(self);
        Ok(())
    }
}

/// `GET /feed` / `POST /feed` against a running service.
pub struct HttpFeedClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct ClearAck {
    success: bool,
    #[serde(default)]
    message: String,
}

impl HttpFeedClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("feed-sync-client/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL for a read, e.g. `http://host/feed?category=all&limit=15&refresh=false`.
    pub fn feed_url(&self, query: &FeedQuery) -> String {
        format!(
            "{}/feed?category={}&limit={}&refresh={}",
            self.base_url,
            query.category_label(),
            query.limit,
            query.force_refresh
        )
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedClient {
    async fn fetch(&self, query: &FeedQuery) -> Result<FeedResponse> {
        let url = self.feed_url(query);
        let resp = self.http.get(&url).send().await.context("fetch /feed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("/feed returned status {status}");
        }
        let body = resp.text().await.context("read /feed body")?;
        serde_json::from_str(&body).context("parse /feed JSON")
    }

    async fn clear_cache(&self) -> Result<()> {
        let url = format!("{}/feed", self.base_url);
        let resp = self.http.post(&url).send().await.context("POST /feed")?;
        let ack: ClearAck = resp.json().await.context("parse clear-cache ack")?;
        if !ack.success {
            anyhow::bail!("clear-cache rejected: {}", ack.message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Category;

    #[test]
    fn feed_url_encodes_query() {
        let c = HttpFeedClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        let q = FeedQuery::new(Some(Category::Technology), 3).forced();
        assert_eq!(
            c.feed_url(&q),
            "http://localhost:8000/feed?category=technology&limit=3&refresh=true"
        );
        assert_eq!(
            c.feed_url(&FeedQuery::default()),
            "http://localhost:8000/feed?category=all&limit=15&refresh=false"
        );
    }
}
