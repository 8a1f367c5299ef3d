//! Shared route helpers for page rendering.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;

use crate::cache::CacheMetadata;
use crate::editor::{EditorView, FieldKind, Row, Widget};
use crate::state::AppState;

/// Render a template, or a plain error page if rendering fails.
pub fn render_template(
    state: &AppState,
    status: StatusCode,
    template: &str,
    context: &tera::Context,
) -> Response {
    match state.theme().render(template, context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, template = %template, "failed to render template");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    r#"<!DOCTYPE html>
<html><head><title>Error</title></head>
<body><h1>Template Error</h1><pre>{}</pre></body></html>"#,
                    html_escape(&format!("{e:#}"))
                )),
            )
                .into_response()
        }
    }
}

/// Attach cache headers to a response body.
pub fn with_cache_headers(metadata: &CacheMetadata, body: impl IntoResponse) -> Response {
    (metadata.headers(), body).into_response()
}

/// HTML-escape a string for safe output.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[derive(Serialize)]
struct TemplateCell {
    name: &'static str,
    kind: FieldKind,
    value: String,
}

#[derive(Serialize)]
struct TemplateRow {
    index: usize,
    remove: bool,
    cells: Vec<TemplateCell>,
}

fn template_rows(widget: Widget, rows: &[Row]) -> Vec<TemplateRow> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| TemplateRow {
            index,
            remove: row.remove,
            cells: widget
                .fields()
                .iter()
                .map(|field| TemplateCell {
                    name: field.name,
                    kind: field.kind,
                    value: row.text(field.name),
                })
                .collect(),
        })
        .collect()
}

/// Template context for the row editor and its row table.
pub fn editor_context(view: &EditorView, csrf_token: &str) -> tera::Context {
    let fields = view.widget.fields();
    let mut context = tera::Context::new();
    context.insert("block_id", &view.block_id);
    context.insert("widget", view.widget.machine_name());
    context.insert("widget_label", view.widget.label());
    context.insert("label", &view.label);
    context.insert("form_build_id", &view.form_build_id);
    context.insert(
        "parent_build_id",
        view.parent_build_id.as_deref().unwrap_or_default(),
    );
    context.insert("csrf_token", csrf_token);
    context.insert("saved", &view.saved());
    context.insert(
        "errors",
        &view.errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
    );
    context.insert("fields", fields);
    context.insert("column_count", &(fields.len() + 3));
    context.insert("rows", &template_rows(view.widget, &view.rows));
    context
}
