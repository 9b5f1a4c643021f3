//! Assertion helpers for tests.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use std::time::Duration;

use super::app::TestResponse;

/// Assert response has expected status code
pub fn assert_status(response: &TestResponse, expected: StatusCode) {
    assert_eq!(
        response.status,
        expected,
        "Expected status {}, got {}. Body: {}",
        expected,
        response.status,
        response.text()
    );
}

/// Assert response is OK (200)
pub fn assert_ok(response: &TestResponse) {
    assert_status(response, StatusCode::OK);
}

/// Assert response is a complete PDF document
pub fn assert_pdf(response: &TestResponse) {
    assert_ok(response);
    assert!(
        response.body_error.is_none(),
        "PDF body failed: {:?}",
        response.body_error
    );
    assert!(
        response.is_pdf(),
        "Expected PDF, got {} bytes starting with {:?}",
        response.body.len(),
        &response.body[..8.min(response.body.len())]
    );
    assert_eq!(
        response.content_type(),
        Some("application/pdf"),
        "Expected Content-Type: application/pdf"
    );
}

/// Assert JSON error response carries the expected status field
pub fn assert_json_status(response: &TestResponse, expected_status: u16) {
    let json: serde_json::Value = response.json();
    assert_eq!(
        json["status"].as_u64(),
        Some(expected_status as u64),
        "Expected JSON status {}, got {:?}. Full response: {}",
        expected_status,
        json["status"],
        serde_json::to_string_pretty(&json).unwrap()
    );
}

/// Poll `condition` until it holds, failing the test after one second
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
