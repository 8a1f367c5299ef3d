//! Curated content feed.

use axum::{
    Router,
    extract::State,
    http::header,
    response::Response,
    routing::get,
};

use crate::cache::{CachedEntry, ResponseCache};
use crate::error::{AppError, AppResult};
use crate::routes::helpers::with_cache_headers;
use crate::state::AppState;

/// Create the curated feed router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/curated", get(curated_feed))
}

async fn curated_feed(State(state): State<AppState>) -> AppResult<Response> {
    let key = ResponseCache::key("curated", &[]);
    let entry = match state.cache().get(&key) {
        Some(entry) => entry,
        None => {
            let (feed, metadata) = state.curated().feed().await?;
            let body = serde_json::to_string(&feed).map_err(|e| AppError::Internal(e.into()))?;
            let entry = CachedEntry { body, metadata };
            state.cache().set(&key, entry.clone());
            entry
        }
    };
    state.curated().record_access().await?;

    Ok(with_cache_headers(
        &entry.metadata,
        ([(header::CONTENT_TYPE, "application/json")], entry.body),
    ))
}
