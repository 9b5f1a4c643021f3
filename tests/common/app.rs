//! Test application factory for integration tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use pagepool::models::AppConfig;
use pagepool::server::{build_router, create_app_state_with_factory};
use pagepool::services::{PdfGenerator, PoolConfig};

use super::mock_engine::{MockControls, MockFactory};

/// Pool settings that keep tests deterministic: no evictor, small capacity
pub fn test_pool_config() -> PoolConfig {
    PoolConfig {
        min: 1,
        max: 2,
        eviction_interval_ms: 0,
        ..PoolConfig::default()
    }
}

/// Test application with router and direct access to the renderer pool
pub struct TestApp {
    router: axum::Router,
    pub generator: Arc<PdfGenerator<MockFactory>>,
    pub controls: Arc<MockControls>,
}

impl TestApp {
    /// Create a new test application backed by the mock engine
    pub fn new() -> Self {
        Self::with_pool(test_pool_config())
    }

    pub fn with_pool(pool: PoolConfig) -> Self {
        let factory = MockFactory::new();
        let controls = factory.controls.clone();
        let config = AppConfig {
            pool,
            ..AppConfig::default()
        };

        // Build router using shared server module (same as production)
        let state =
            create_app_state_with_factory(factory, &config).expect("Failed to create app state");
        let generator = state.generator.clone();
        let router = build_router(state);

        Self {
            router,
            generator,
            controls,
        }
    }

    /// Make a GET request to the given path
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::post(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Send a request to the router
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes().to_vec());

        match body {
            Ok(body) => TestResponse {
                status,
                headers,
                body,
                body_error: None,
            },
            Err(e) => TestResponse {
                status,
                headers,
                body: Vec::new(),
                body_error: Some(e.to_string()),
            },
        }
    }
}

/// Test response with convenience methods
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
    /// Set when the body stream failed after the status line was sent
    pub body_error: Option<String>,
}

impl TestResponse {
    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }

    /// Get body as string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
    }

    /// Check if the body looks like a PDF document
    pub fn is_pdf(&self) -> bool {
        self.body.starts_with(b"%PDF-")
    }
}
