#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Row editor flows: form posts, AJAX rebuilds, saving and image promotion.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{OpenForm, TestApp, TestResponse};
use meridian_kernel::editor::state_key;
use meridian_kernel::form::{FormState, FormStateStore};
use meridian_test_utils::temporary_file;

const LEADERSHIP_EDIT: &str = "/admin/blocks/leadership/edit";

fn seed_leadership(app: &TestApp, names: &[&str]) {
    let rows: Vec<_> = names.iter().map(|name| json!({"name": name})).collect();
    app.backends.config.put(
        "block.leadership",
        json!({"widget": "executives", "label": "Leadership", "rows": rows}),
    );
}

async fn open(app: &TestApp, uri: &str) -> (TestResponse, OpenForm) {
    let response = app.get(uri).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    let form = OpenForm::from_response(&response, None);
    (response, form)
}

async fn add_row(app: &TestApp, ajax_uri: &str, form: &OpenForm) {
    let response = app
        .post_json(
            ajax_uri,
            &json!({"form_build_id": form.build_id(), "trigger": "add_row"}),
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
}

fn table_html(response: &TestResponse) -> String {
    response.json()["commands"][0]["html"]
        .as_str()
        .unwrap()
        .to_string()
}

fn rendered_names(response: &TestResponse) -> Vec<String> {
    (0..)
        .map_while(|i| response.input_value(&format!("rows[{i}][name]")))
        .collect()
}

#[tokio::test]
async fn test_remove_then_save_persists_remaining_rows() {
    let app = TestApp::new();
    seed_leadership(&app, &["A", "B"]);

    let (page, form) = open(&app, LEADERSHIP_EDIT).await;
    assert_eq!(rendered_names(&page), vec!["A", "B"]);

    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][name]", "A"),
                ("rows[1][name]", "B"),
                ("op", "remove_row:0"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(rendered_names(&response), vec!["B"]);

    // Nothing is persisted before saving
    let stored = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(stored["rows"], json!([{"name": "A"}, {"name": "B"}]));

    let form = form.next(&response);
    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][name]", "B"),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("The rows have been saved."));

    let stored = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(stored["widget"], "executives");
    assert_eq!(stored["label"], "Leadership");
    assert_eq!(stored["rows"], json!([{"name": "B"}]));
}

#[tokio::test]
async fn test_add_then_remove_leaves_rows_unchanged() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let added = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({"form_build_id": form.build_id(), "trigger": "add_row"}),
            Some(&form.cookie),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK);
    let commands = added.json()["commands"].clone();
    assert_eq!(commands[0]["command"], "replace");
    assert_eq!(commands[0]["selector"], "#rows-wrapper");
    let html = commands[0]["html"].as_str().unwrap();
    assert!(html.contains("rows[1][name]"));

    let removed = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({
                "form_build_id": form.build_id(),
                "trigger": "remove_row:1",
                "values": {"rows[0][name]": "A", "rows[1][name]": ""}
            }),
            Some(&form.cookie),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let commands = removed.json()["commands"].clone();
    let html = commands[0]["html"].as_str().unwrap();
    assert!(html.contains("rows[0][name]"));
    assert!(!html.contains("rows[1][name]"));

    let last = commands.as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["command"], "update_build_id");
    assert_eq!(last["form_build_id"], form.build_id());
}

async fn save_leadership(app: &TestApp, form: &OpenForm) -> TestResponse {
    app.post_form(
        LEADERSHIP_EDIT,
        &[
            ("_token", form.token.as_str()),
            ("form_build_id", form.build_id()),
            ("rows[0][name]", "  Ada  "),
            ("rows[1][name]", "Grace"),
            ("op", "save"),
        ],
        Some(&form.cookie),
    )
    .await
}

#[tokio::test]
async fn test_saving_twice_is_stable() {
    let app = TestApp::new();
    seed_leadership(&app, &["  Ada  ", "Grace"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let first = save_leadership(&app, &form).await;
    assert_eq!(first.status, StatusCode::OK);
    let after_first = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(after_first["rows"], json!([{"name": "Ada"}, {"name": "Grace"}]));

    let second = save_leadership(&app, &form.next(&first)).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.body.contains("The rows have been saved."));

    let after_second = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_ajax_cannot_save() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let response = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({
                "form_build_id": form.build_id(),
                "trigger": "save",
                "values": {"rows[0][name]": "Changed"}
            }),
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let stored = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(stored["rows"], json!([{"name": "A"}]));
}

#[tokio::test]
async fn test_working_copy_is_bound_to_its_session() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    // No session at all
    let response = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({
                "form_build_id": form.build_id(),
                "trigger": "add_row",
                "values": {"rows[0][name]": "Hijacked"}
            }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // A different session with its own valid token
    let (_, other) = open(&app, LEADERSHIP_EDIT).await;
    assert_ne!(other.cookie, form.cookie);
    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("_token", other.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][name]", "Hijacked"),
                ("op", "save"),
            ],
            Some(&other.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let stored = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(stored["rows"], json!([{"name": "A"}]));
    let state = app.backends.forms.get(form.build_id()).unwrap();
    let copy = &state.extra[&state_key("leadership")];
    assert_eq!(copy["rows"], json!([{"name": "A"}]));
}

#[tokio::test]
async fn test_remove_selected_uses_submitted_indices() {
    let app = TestApp::new();
    seed_leadership(&app, &["A", "B"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let response = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({
                "form_build_id": form.build_id(),
                "trigger": "remove_selected",
                "values": {"rows[1][remove]": true}
            }),
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let html = table_html(&response);
    assert!(html.contains(r#"name="rows[0][name]" value="A""#));
    assert!(!html.contains("rows[1][name]"));
}

#[tokio::test]
async fn test_parent_working_copy_wins_over_persisted_rows() {
    let app = TestApp::new();
    seed_leadership(&app, &["Persisted"]);

    let mut parent = FormState::new("layout_editor", "form-outer");
    parent.extra.insert(
        state_key("leadership"),
        json!({"phase": "editing", "rows": [{"name": "From parent"}]}),
    );
    app.backends.forms.save(&parent).await.unwrap();

    let (page, form) = open(&app, "/admin/blocks/leadership/edit?parent=form-outer").await;
    assert_eq!(rendered_names(&page), vec!["From parent"]);
    assert_eq!(page.input_value("parent_build_id").as_deref(), Some("form-outer"));

    // Edits are mirrored back into the parent
    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("parent_build_id", "form-outer"),
                ("rows[0][name]", "From parent"),
                ("op", "add_row"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let parent = app.backends.forms.get("form-outer").unwrap();
    let copy = &parent.extra[&state_key("leadership")];
    assert_eq!(copy["rows"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unconfigured_block_needs_widget() {
    let app = TestApp::new();

    let response = app.get("/admin/blocks/offices/edit").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get("/admin/blocks/offices/edit?widget=carousel").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let (page, _) = open(&app, "/admin/blocks/offices/edit?widget=map_pins").await;
    assert!(page.body.contains("No rows yet."));
}

#[tokio::test]
async fn test_map_pins_are_clamped_on_save() {
    let app = TestApp::new();
    let (_, form) = open(&app, "/admin/blocks/offices/edit?widget=map_pins").await;
    add_row(&app, "/admin/blocks/offices/ajax?widget=map_pins", &form).await;

    let response = app
        .post_form(
            "/admin/blocks/offices/edit?widget=map_pins",
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][city]", "Oslo"),
                ("rows[0][label]", "HQ"),
                ("rows[0][x]", "1.5"),
                ("rows[0][y]", "0.25"),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let stored = app.backends.config.get("block.offices").unwrap();
    assert_eq!(stored["widget"], "map_pins");
    assert_eq!(
        stored["rows"],
        json!([{"city": "Oslo", "label": "HQ", "x": 1.0, "y": 0.25}])
    );
}

#[tokio::test]
async fn test_card_images_are_promoted_once() {
    let app = TestApp::new();
    app.backends.files.add(temporary_file(42, "promo.png"));
    let (_, form) = open(&app, "/admin/blocks/promos/edit?widget=cards").await;
    add_row(&app, "/admin/blocks/promos/ajax?widget=cards", &form).await;

    let response = app
        .post_form(
            "/admin/blocks/promos/edit?widget=cards",
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][header]", "Spring"),
                ("rows[0][image]", "42"),
                ("rows[0][image_mobile]", "42"),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.backends.files.save_count(), 1);

    let stored = app.backends.config.get("block.promos").unwrap();
    assert_eq!(stored["rows"][0]["image"], "/files/promo.png");
    assert_eq!(stored["rows"][0]["image_mobile"], "/files/promo.png");
}

#[tokio::test]
async fn test_card_with_one_stored_image_fills_the_other_slot() {
    let app = TestApp::new();
    app.backends.config.put(
        "block.promos",
        json!({"widget": "cards", "rows": [{"header": "Spring", "image": "/files/a.png"}]}),
    );
    let (_, form) = open(&app, "/admin/blocks/promos/edit").await;

    let response = app
        .post_form(
            "/admin/blocks/promos/edit",
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][header]", "Spring"),
                ("rows[0][image]", "/files/a.png"),
                ("rows[0][image_mobile]", ""),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.backends.files.save_count(), 0);

    let stored = app.backends.config.get("block.promos").unwrap();
    assert_eq!(
        stored["rows"],
        json!([{"header": "Spring", "image": "/files/a.png", "image_mobile": "/files/a.png"}])
    );
}

#[tokio::test]
async fn test_failed_promotion_blocks_save() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("_token", form.token.as_str()),
                ("form_build_id", form.build_id()),
                ("rows[0][name]", "A"),
                ("rows[0][image]", "99"),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("An image could not be saved: File not found."));

    let stored = app.backends.config.get("block.leadership").unwrap();
    assert_eq!(stored["rows"], json!([{"name": "A"}]));
}

#[tokio::test]
async fn test_form_post_requires_token() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    let (_, form) = open(&app, LEADERSHIP_EDIT).await;

    let response = app
        .post_form(
            LEADERSHIP_EDIT,
            &[
                ("form_build_id", form.build_id()),
                ("rows[0][name]", "A"),
                ("op", "save"),
            ],
            Some(&form.cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ajax_with_expired_build_is_rejected() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);

    let response = app
        .post_json(
            "/admin/blocks/leadership/ajax",
            &json!({"form_build_id": "form-gone", "trigger": "add_row"}),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expired_form_states_are_purged() {
    let app = TestApp::new();
    seed_leadership(&app, &["A"]);
    open(&app, LEADERSHIP_EDIT).await;
    assert_eq!(app.backends.forms.len(), 1);

    app.backends.clock.advance(7 * 3600);
    let removed = app.state.editor().purge_expired_states().await.unwrap();
    assert_eq!(removed, 1);
    assert!(app.backends.forms.is_empty());
}
