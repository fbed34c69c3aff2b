use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::feed::types::{Category, FeedQuery};
use crate::sync::{FeedResponse, SyncService};

#[derive(Clone)]
pub struct AppState {
    sync: Arc<SyncService>,
}

/// `GET /health`, `GET /feed`, `POST /feed`.
pub fn router(sync: Arc<SyncService>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/feed", get(get_feed).post(clear_feed_cache))
        .layer(CorsLayer::very_permissive())
        .with_state(AppState { sync })
}

/// Lenient query parsing: unknown categories read as "all", bad limits as the default.
fn parse_query(sync: &SyncService, q: &HashMap<String, String>) -> FeedQuery {
    let category = match q.get("category").map(|s| s.trim()) {
        None | Some("") => None,
        Some(s) if s.eq_ignore_ascii_case("all") => None,
        Some(s) => {
            let parsed = Category::parse_lenient(s);
            if parsed.is_none() {
                tracing::warn!(target: "feed::api", category = s, "unknown category; serving all");
            }
            parsed
        }
    };
    let limit = q.get("limit").and_then(|s| s.trim().parse::<usize>().ok());
    let refresh = q
        .get("refresh")
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);
    sync.query(category, limit, refresh)
}

async fn get_feed(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<FeedResponse> {
    let query = parse_query(&state.sync, &q);
    let sync = Arc::clone(&state.sync);
    // A panic inside generation must still produce content.
    match tokio::spawn(async move { sync.get_feed(query).await }).await {
        Ok(resp) => Json(resp),
        Err(e) => {
            tracing::error!(target: "feed::api", error = %e, "feed task aborted; serving fallback");
            Json(
                state
                    .sync
                    .fallback_response(query, format!("feed generation aborted: {e}")),
            )
        }
    }
}

#[derive(serde::Serialize)]
struct ClearResp {
    success: bool,
    message: String,
}

async fn clear_feed_cache(State(state): State<AppState>) -> Json<ClearResp> {
    let removed = state.sync.clear_cache();
    Json(ClearResp {
        success: true,
        message: format!("cache cleared ({removed} entries)"),
    })
}
