//! Public rendering of widget blocks.

use axum::{
    Router,
    extract::{Path, State},
    response::{Html, Response},
    routing::get,
};

use crate::cache::{CacheMetadata, CachedEntry, ResponseCache};
use crate::config_storage::names;
use crate::editor::block_cache_tag;
use crate::error::{AppError, AppResult};
use crate::routes::helpers::with_cache_headers;
use crate::state::AppState;

/// Create the block router.
pub fn router() -> Router<AppState> {
    Router::new().route("/block/{block_id}", get(render_block))
}

async fn render_block(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
) -> AppResult<Response> {
    let key = ResponseCache::key("block", &[("id", &block_id)]);
    if let Some(entry) = state.cache().get(&key) {
        return Ok(with_cache_headers(&entry.metadata, Html(entry.body)));
    }

    let block = state
        .editor()
        .block(&block_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut context = tera::Context::new();
    context.insert("block_id", &block_id);
    context.insert("label", &block.label);
    context.insert("rows", &block.rows);

    let body = state.theme().render(block.widget.template(), &context)?;

    let metadata = CacheMetadata::new()
        .with_tag(block_cache_tag(&block_id))
        .with_tag(format!("config:{}", names::block(&block_id)));
    let entry = CachedEntry { body, metadata };
    state.cache().set(&key, entry.clone());

    Ok(with_cache_headers(&entry.metadata, Html(entry.body)))
}
