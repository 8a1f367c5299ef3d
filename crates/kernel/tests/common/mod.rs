#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] runs the real kernel router and services on in-memory
//! backends, with a memory session store standing in for Redis. Every test
//! builds its own app, so tests never share state.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, LazyLock};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use regex::Regex;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};

use meridian_kernel::{AppState, routes};
use meridian_test_utils::{TestBackends, test_state_parts};

static HIDDEN_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="([^"]+)" value="([^"]*)""#).unwrap());

/// Test application wrapper using the real kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub backends: TestBackends,
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("response is not JSON ({e}): {}", self.body))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The session cookie set by this response, as `name=value`.
    pub fn session_cookie(&self) -> Option<String> {
        let cookie = self.header(header::SET_COOKIE.as_str())?;
        cookie.split(';').next().map(str::to_string)
    }

    /// Value of the first input named `name` in an HTML body.
    pub fn input_value(&self, name: &str) -> Option<String> {
        HIDDEN_INPUT
            .captures_iter(&self.body)
            .find(|caps| &caps[1] == name)
            .map(|caps| caps[2].to_string())
    }
}

impl TestApp {
    /// Create an app on fresh in-memory backends.
    pub fn new() -> Self {
        Self::with_backends(TestBackends::new())
    }

    /// Create an app on the given backends.
    pub fn with_backends(backends: TestBackends) -> Self {
        let parts = test_state_parts(&backends).expect("Failed to build state parts");
        let state = AppState::from_parts(parts);

        let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);

        let router = routes::router()
            .layer(session_layer)
            .with_state(state.clone());

        Self {
            router,
            state,
            backends,
        }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.get_with_cookie(uri, None).await
    }

    pub async fn get_with_cookie(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// POST url-encoded form pairs.
    pub async fn post_form(
        &self,
        uri: &str,
        pairs: &[(&str, &str)],
        cookie: Option<&str>,
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// POST a JSON body.
    pub async fn post_json(
        &self,
        uri: &str,
        value: &serde_json::Value,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(value.to_string())).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

/// A form page opened in a session: cookie, CSRF token and build id.
#[derive(Debug, Clone)]
pub struct OpenForm {
    pub cookie: String,
    pub token: String,
    pub form_build_id: Option<String>,
}

impl OpenForm {
    /// Read the form handles out of a rendered page.
    pub fn from_response(response: &TestResponse, cookie: Option<&str>) -> Self {
        let cookie = response
            .session_cookie()
            .or_else(|| cookie.map(str::to_string))
            .expect("response has no session cookie");
        Self {
            cookie,
            token: response.input_value("_token").expect("page has no CSRF token"),
            form_build_id: response.input_value("form_build_id"),
        }
    }

    /// Follow-up handles after re-rendering in the same session.
    pub fn next(&self, response: &TestResponse) -> Self {
        Self::from_response(response, Some(&self.cookie))
    }

    pub fn build_id(&self) -> &str {
        self.form_build_id.as_deref().expect("page has no form build id")
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Log output of the current thread while alive.
///
/// `#[tokio::test]` runs on a single thread, so this sees every event the
/// handlers emit during the test.
pub struct CapturedLogs {
    buffer: SharedBuffer,
    _guard: tracing::subscriber::DefaultGuard,
}

impl CapturedLogs {
    pub fn start() -> Self {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        Self {
            buffer,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.0.lock()).into_owned()
    }

    /// Number of lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}
