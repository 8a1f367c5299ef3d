//! Admin row editor for widget blocks.

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::editor::{EditorView, Widget};
use crate::error::{AppError, AppResult};
use crate::form::{
    AjaxRequest, AjaxResponse, generate_csrf_token, session_form_key, verify_csrf_token,
};
use crate::routes::helpers::{editor_context, render_template};
use crate::state::AppState;

/// Selector of the region AJAX callbacks rebuild.
pub const ROWS_WRAPPER: &str = "#rows-wrapper";

/// Create the block editor router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/blocks/{block_id}/edit",
            get(edit_form).post(edit_submit),
        )
        .route("/admin/blocks/{block_id}/ajax", post(edit_ajax))
}

/// Query parameters of the editor routes.
#[derive(Debug, Default, Deserialize)]
pub struct EditorParams {
    /// Widget type for blocks without configuration.
    pub widget: Option<String>,
    /// Build id of the enclosing layout form.
    pub parent: Option<String>,
}

impl EditorParams {
    fn widget(&self) -> AppResult<Option<Widget>> {
        self.widget
            .as_deref()
            .filter(|w| !w.trim().is_empty())
            .map(|w| w.parse::<Widget>().map_err(AppError::BadRequest))
            .transpose()
    }
}

async fn render_editor(
    state: &AppState,
    session: &Session,
    view: &EditorView,
) -> AppResult<Response> {
    let csrf_token = generate_csrf_token(session).await?;
    let status = if view.errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok(render_template(
        state,
        status,
        "admin/row-editor.html",
        &editor_context(view, &csrf_token),
    ))
}

async fn edit_form(
    State(state): State<AppState>,
    session: Session,
    Path(block_id): Path<String>,
    Query(params): Query<EditorParams>,
) -> AppResult<Response> {
    let owner = session_form_key(&session).await?;
    let view = state
        .editor()
        .open(&block_id, params.widget()?, params.parent.clone(), &owner)
        .await?;
    render_editor(&state, &session, &view).await
}

async fn edit_submit(
    State(state): State<AppState>,
    session: Session,
    Path(block_id): Path<String>,
    Query(params): Query<EditorParams>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let token = pairs
        .iter()
        .find(|(name, _)| name == "_token")
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();
    if !verify_csrf_token(&session, token).await? {
        return Err(AppError::Forbidden("invalid or expired form token".to_string()));
    }

    let owner = session_form_key(&session).await?;
    let view = state
        .editor()
        .submit(&block_id, params.widget()?, pairs, &owner)
        .await?;
    render_editor(&state, &session, &view).await
}

/// Rebuild the row table after an editor button press.
async fn edit_ajax(
    State(state): State<AppState>,
    session: Session,
    Path(block_id): Path<String>,
    Query(params): Query<EditorParams>,
    Json(request): Json<AjaxRequest>,
) -> AppResult<Json<AjaxResponse>> {
    let owner = session_form_key(&session).await?;
    let view = state
        .editor()
        .ajax(&block_id, params.widget()?, request, &owner)
        .await?;

    // The row table carries no token of its own
    let html = state
        .theme()
        .render("admin/row-table.html", &editor_context(&view, ""))?;

    let mut response = AjaxResponse::new().replace(ROWS_WRAPPER, html);
    if !view.errors.is_empty() {
        let messages = view.errors.iter().map(|e| e.message.clone()).collect();
        response = response.messages(ROWS_WRAPPER, messages);
    } else if view.saved() {
        response = response.messages(ROWS_WRAPPER, vec!["The rows have been saved.".to_string()]);
    }
    Ok(Json(response.update_build_id(view.form_build_id)))
}
