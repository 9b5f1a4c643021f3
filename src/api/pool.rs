use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::rendering::RendererHandle;
use crate::services::{PdfGenerator, PoolStats, ResourceFactory};

/// Renderer pool counters
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolStatsResponse {
    /// Live renderers, including ones being created
    pub size: usize,
    /// Idle renderers ready for a request
    pub available: usize,
    /// Renderers serving a request
    pub borrowed: usize,
    /// Requests waiting for a renderer
    pub pending: usize,
    pub min: usize,
    pub max: usize,
}

impl From<PoolStats> for PoolStatsResponse {
    fn from(stats: PoolStats) -> Self {
        Self {
            size: stats.size,
            available: stats.available,
            borrowed: stats.borrowed,
            pending: stats.pending,
            min: stats.min,
            max: stats.max,
        }
    }
}

/// Report renderer pool usage
#[utoipa::path(
    get,
    path = "/api/pool",
    responses(
        (status = 200, description = "Pool counters", body = PoolStatsResponse),
    ),
    tag = "Pool"
)]
pub async fn handle_pool_stats<F>(
    State(generator): State<Arc<PdfGenerator<F>>>,
) -> Json<PoolStatsResponse>
where
    F: ResourceFactory,
    F::Resource: RendererHandle,
{
    Json(generator.stats().into())
}
