//! Insights search API.

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::Response,
    routing::get,
};
use serde::Deserialize;

use crate::cache::{CachedEntry, ResponseCache};
use crate::error::{AppError, AppResult};
use crate::routes::helpers::with_cache_headers;
use crate::search::SearchQuery;
use crate::state::AppState;

/// Create the search router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/insights/search", get(search_insights))
}

/// Raw query parameters. Non-numeric numbers fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

fn number(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

impl SearchParams {
    fn normalize(&self) -> SearchQuery {
        SearchQuery::normalize(
            self.q.as_deref(),
            number(self.limit.as_deref()),
            number(self.page.as_deref()),
        )
    }
}

fn json_response(entry: &CachedEntry) -> Response {
    with_cache_headers(
        &entry.metadata,
        ([(header::CONTENT_TYPE, "application/json")], entry.body.clone()),
    )
}

/// Search published insights.
async fn search_insights(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Response> {
    let query = params.normalize();
    let key = ResponseCache::key(
        "insights_search",
        &[
            ("q", &query.keyword),
            ("limit", &query.limit.to_string()),
            ("page", &query.page.to_string()),
        ],
    );

    if let Some(entry) = state.cache().get(&key) {
        return Ok(json_response(&entry));
    }

    let (envelope, metadata) = state.search().search(&query).await?;
    let body = serde_json::to_string(&envelope).map_err(|e| AppError::Internal(e.into()))?;

    let entry = CachedEntry { body, metadata };
    state.cache().set(&key, entry.clone());
    Ok(json_response(&entry))
}
