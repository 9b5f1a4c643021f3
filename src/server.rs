//! HTTP server setup and configuration.
//!
//! This module provides the router and application state used by both
//! the production server and integration tests.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{self, PdfRequest, PoolStatsResponse};
use crate::error::ApiError;
use crate::models::AppConfig;
use crate::rendering::{ChromeFactory, RendererHandle};
use crate::services::{PdfGenerator, ResourceFactory};

/// Application state shared across all handlers.
pub struct AppState<F: ResourceFactory> {
    pub generator: Arc<PdfGenerator<F>>,
}

impl<F: ResourceFactory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            generator: self.generator.clone(),
        }
    }
}

/// Create application state backed by headless Chrome.
pub fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState<ChromeFactory>> {
    let factory = ChromeFactory::from_config(&config.chrome)
        .map_err(|e| anyhow::anyhow!("Failed to set up renderer: {e}"))?;
    create_app_state_with_factory(factory, config)
}

/// Create application state with any renderer factory.
pub fn create_app_state_with_factory<F>(factory: F, config: &AppConfig) -> anyhow::Result<AppState<F>>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    let generator = PdfGenerator::new(factory, config.pool.clone())
        .map_err(|e| anyhow::anyhow!("Failed to create renderer pool: {e}"))?
        .with_default_options(config.render.clone());

    Ok(AppState {
        generator: Arc::new(generator),
    })
}

/// Build the API router with all endpoints and middleware.
pub fn build_router<F>(state: AppState<F>) -> Router
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    Router::new()
        .route("/api/pdf", post(handle_pdf::<F>))
        .route("/api/pool", get(handle_pool_stats::<F>))
        // Health check
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// Wrapper handlers to extract state components for the underlying API handlers

async fn handle_pdf<F>(
    State(state): State<AppState<F>>,
    request: Json<PdfRequest>,
) -> Result<axum::response::Response, ApiError>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    api::handle_pdf(State(state.generator), request).await
}

async fn handle_pool_stats<F>(State(state): State<AppState<F>>) -> Json<PoolStatsResponse>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    api::handle_pool_stats(State(state.generator)).await
}
