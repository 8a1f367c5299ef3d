//! Admin form for the upstream API settings.

use std::collections::HashMap;

use axum::{
    Form, Router,
    extract::State,
    http::StatusCode,
    response::Response,
    routing::get,
};
use tower_sessions::Session;
use tracing::info;

use crate::config_storage::names;
use crate::error::{AppError, AppResult};
use crate::form::{ValidationError, generate_csrf_token, verify_csrf_token};
use crate::routes::helpers::render_template;
use crate::settings::{ApiSettings, ApiSettingsSubmission};
use crate::state::AppState;

const TEMPLATE: &str = "admin/api-settings.html";

/// Create the settings router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/admin/config/api",
        get(settings_form).post(settings_submit),
    )
}

async fn render_form(
    state: &AppState,
    session: &Session,
    status: StatusCode,
    settings: &ApiSettings,
    has_secret: bool,
    errors: &[ValidationError],
    saved: bool,
) -> AppResult<Response> {
    let csrf_token = generate_csrf_token(session).await?;

    let field_errors: HashMap<&str, &str> = errors
        .iter()
        .filter_map(|e| Some((e.field.as_deref()?, e.message.as_str())))
        .collect();
    let form_errors: Vec<&str> = errors
        .iter()
        .filter(|e| e.field.is_none())
        .map(|e| e.message.as_str())
        .collect();

    // The secret is never rendered back
    let visible = ApiSettings {
        secret_token: String::new(),
        ..settings.clone()
    };

    let mut context = tera::Context::new();
    context.insert("settings", &visible);
    context.insert("has_secret", &has_secret);
    context.insert("field_errors", &field_errors);
    context.insert("form_errors", &form_errors);
    context.insert("saved", &saved);
    context.insert("csrf_token", &csrf_token);

    Ok(render_template(state, status, TEMPLATE, &context))
}

async fn settings_form(State(state): State<AppState>, session: Session) -> AppResult<Response> {
    let settings = ApiSettings::load(state.config_storage().as_ref()).await?;
    let has_secret = !settings.secret_token.is_empty();
    render_form(&state, &session, StatusCode::OK, &settings, has_secret, &[], false).await
}

async fn settings_submit(
    State(state): State<AppState>,
    session: Session,
    Form(submission): Form<ApiSettingsSubmission>,
) -> AppResult<Response> {
    if !verify_csrf_token(&session, &submission.token).await? {
        return Err(AppError::Forbidden("invalid or expired form token".to_string()));
    }

    let storage = state.config_storage().as_ref();
    let stored = ApiSettings::load(storage).await?;
    let settings = submission.merge_into(&stored);
    let has_secret = !settings.secret_token.is_empty();

    let errors = settings.validate();
    if !errors.is_empty() {
        return render_form(
            &state,
            &session,
            StatusCode::UNPROCESSABLE_ENTITY,
            &settings,
            has_secret,
            &errors,
            false,
        )
        .await;
    }

    settings.save(storage).await?;
    state
        .cache()
        .invalidate_tag(&format!("config:{}", names::API_SETTINGS));
    info!(endpoint = %settings.endpoint_url, "API settings saved");

    render_form(&state, &session, StatusCode::OK, &settings, has_secret, &[], true).await
}
