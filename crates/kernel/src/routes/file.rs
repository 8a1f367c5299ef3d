//! Asset promotion endpoint.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};

use crate::file::PromotionResponse;
use crate::state::AppState;

/// Create the file router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/files/{fid}/promote", post(promote_file))
}

/// Promote a temporary upload. Errors are reported in the body and mirrored
/// in the status code.
async fn promote_file(
    State(state): State<AppState>,
    Path(fid): Path<i64>,
) -> (StatusCode, Json<PromotionResponse>) {
    let result = state.promoter().promote(fid).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    (status, Json(result.into()))
}
