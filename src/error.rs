use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a renderer engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to create renderer: {0}")]
    Creation(#[source] EngineError),

    #[error("Pool is closed")]
    Closed,

    #[error("Timed out waiting for a renderer after {0:?}")]
    Timeout(Duration),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Error returned by a PDF generation request.
///
/// Errors raised while the stream of an already opened session is being
/// consumed are not represented here; they arrive as `Err` items on the
/// stream itself.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Content load failed: {0}")]
    ContentLoad(#[source] EngineError),

    #[error("Rendering failed: {0}")]
    Render(#[source] EngineError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Generate(GenerateError::Pool(PoolError::Closed))
            | ApiError::Generate(GenerateError::Pool(PoolError::Timeout(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Generate(GenerateError::ContentLoad(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Generate(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(json!({
            "status": status.as_u16(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
