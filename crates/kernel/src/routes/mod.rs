//! HTTP route handlers.

pub mod admin_blocks;
pub mod admin_settings;
pub mod blocks;
pub mod curated;
pub mod file;
pub mod health;
pub mod helpers;
pub mod search;

use axum::Router;

use crate::state::AppState;

/// All routes of the service, without middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(search::router())
        .merge(curated::router())
        .merge(file::router())
        .merge(blocks::router())
        .merge(admin_settings::router())
        .merge(admin_blocks::router())
}
