//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock collaborators injected, so the whole HTTP surface can be
//! exercised without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use herald_core::{
    load_config_from_str,
    testing::{MockContentSource, MockNotifier, MockSummarizer},
    SqliteStateStore, StateStore, TrackerService,
};
use herald_server::{state::AppState, wiring};

/// Re-export fixtures for test convenience
pub use herald_core::testing::fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// Provides an in-process server with fully controllable mocks for:
/// - The content source (MockContentSource)
/// - The summarizer (MockSummarizer)
/// - The messaging endpoint (MockNotifier)
///
/// The scheduler is not started; cycles run through `/check`.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_add_channel() {
///     let fixture = TestFixture::new().await;
///     fixture.source.set_channel_name("UC1", "Rust Talks").await;
///
///     let response = fixture.post("/api/v1/channels", json!({
///         "channel_id": "UC1"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// The service behind the router
    pub service: Arc<TrackerService>,
    /// Mock content source - configure channels and items
    pub source: Arc<MockContentSource>,
    /// Mock summarizer - configure summaries and failures
    pub summarizer: Arc<MockSummarizer>,
    /// Mock notifier - inspect sent messages
    pub notifier: Arc<MockNotifier>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for the test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Quota units per window
    pub quota_limit: u64,
    /// Smallest accepted poll interval
    pub min_poll_interval_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            quota_limit: 1000,
            min_poll_interval_secs: 60,
        }
    }
}

impl TestConfig {
    /// Config whose quota cannot pay for a single call.
    pub fn without_quota() -> Self {
        Self {
            quota_limit: 0,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = load_config_from_str(&format!(
            r#"
[database]
path = "{db}"

[tracker]
min_poll_interval_secs = {min_interval}
default_endpoint = "{endpoint}"
initial_lookback_hours = 175200

[scheduler]
worker_pool_size = 2
jitter_max_ms = 0

[quota]
limit_per_window = {quota}
page_cost = 1

[retry.source]
base_delay_ms = 1
max_delay_ms = 5

[retry.summarizer]
base_delay_ms = 1
max_delay_ms = 5

[retry.notifier]
base_delay_ms = 1
max_delay_ms = 5

[source.youtube]
api_key = "test-youtube-key"

[summarizer]
api_key = "test-llm-key"

[notifier.telegram]
bot_token = "test-bot-token"
"#,
            db = db_path.display(),
            min_interval = test_config.min_poll_interval_secs,
            endpoint = fixtures::ENDPOINT,
            quota = test_config.quota_limit,
        ))
        .expect("Failed to parse test config");

        let source = Arc::new(MockContentSource::new());
        let summarizer = Arc::new(MockSummarizer::new());
        let notifier = Arc::new(MockNotifier::new());

        let store: Arc<dyn StateStore> =
            Arc::new(SqliteStateStore::new(&db_path).expect("Failed to create store"));

        let service = wiring::build_tracker(
            &config,
            store,
            wiring::Collaborators {
                source: source.clone(),
                summarizer: summarizer.clone(),
                notifier: notifier.clone(),
            },
        );

        let state = Arc::new(AppState::new(config, Arc::clone(&service)));
        let router = herald_server::api::create_router(state);

        Self {
            router,
            service,
            source,
            summarizer,
            notifier,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    /// Fetch a path and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Add a channel the mock source knows about, asserting success.
    pub async fn track(&self, channel_id: &str) -> Value {
        self.source
            .set_channel_name(channel_id, &format!("Channel {}", channel_id))
            .await;
        let response = self
            .post(
                "/api/v1/channels",
                serde_json::json!({ "channel_id": channel_id }),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "Failed to add channel: {}",
            response.body
        );
        response.body
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
