#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Curated feed tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{CapturedLogs, TestApp};
use meridian_test_utils::{FIXED_TIMESTAMP, test_item};

#[tokio::test]
async fn test_feed_applies_bundle_limits() {
    let app = TestApp::new();
    for n in 0..8 {
        app.backends.content.add_item(
            test_item("insights", &format!("Insight {n}"))
                .created(FIXED_TIMESTAMP + n)
                .build(),
        );
        app.backends
            .content
            .add_item(test_item("notices", &format!("Notice {n}")).build());
    }

    let response = app.get("/api/curated").await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["bundles"], json!(["insights", "notices"]));
    assert_eq!(body["items"]["insights"].as_array().unwrap().len(), 6);
    assert_eq!(body["items"]["notices"].as_array().unwrap().len(), 3);
    assert_eq!(body["items"]["insights"][0]["title"], "Insight 7");
    assert!(body["items"].get("funds").is_none());
    assert_eq!(body["generated"], "2024-03-01T12:00:00Z");
}

#[tokio::test]
async fn test_feed_reports_configured_endpoint() {
    let app = TestApp::new();
    app.backends.config.put(
        "meridian_api.settings",
        json!({
            "endpoint_url": "https://api.example.com/v1",
            "endpoint_label": "",
            "api_key": "k",
            "secret_token": "s",
            "logging_enabled": true
        }),
    );

    let response = app.get("/api/curated").await;
    let body = response.json();
    assert_eq!(body["endpoint"], "https://api.example.com/v1");
    assert_eq!(body["bundles"], json!([]));

    let tags = response.header("x-cache-tags").unwrap();
    assert!(tags.contains("config:meridian_api.settings"));
}

#[tokio::test]
async fn test_feed_skips_unpublished() {
    let app = TestApp::new();
    app.backends
        .content
        .add_item(test_item("funds", "Open fund").build());
    app.backends
        .content
        .add_item(test_item("funds", "Closed fund").unpublished().build());

    let body = app.get("/api/curated").await.json();
    let funds = body["items"]["funds"].as_array().unwrap();
    assert_eq!(funds.len(), 1);
    assert_eq!(funds[0]["title"], "Open fund");
}

fn enable_access_log(app: &TestApp, enabled: bool) {
    app.backends.config.put(
        "meridian_api.settings",
        json!({
            "endpoint_url": "https://api.example.com/v1",
            "endpoint_label": "Primary API",
            "logging_enabled": enabled
        }),
    );
}

#[tokio::test]
async fn test_cached_responses_are_still_logged() {
    let app = TestApp::new();
    enable_access_log(&app, true);
    let logs = CapturedLogs::start();

    for _ in 0..3 {
        let response = app.get("/api/curated").await;
        assert_eq!(response.status, StatusCode::OK);
    }

    assert_eq!(logs.count("curated feed accessed"), 3);
    assert!(logs.contents().contains("Primary API"));
}

#[tokio::test]
async fn test_access_log_follows_setting() {
    let app = TestApp::new();
    enable_access_log(&app, false);
    let logs = CapturedLogs::start();

    app.get("/api/curated").await;
    assert_eq!(logs.count("curated feed accessed"), 0);

    // The toggle is read per request, not from the cached feed
    enable_access_log(&app, true);
    app.get("/api/curated").await;
    assert_eq!(logs.count("curated feed accessed"), 1);
}
