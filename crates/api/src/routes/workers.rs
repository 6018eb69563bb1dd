//! `GET /workers` (spec.md §6) — fleet view over the Heartbeat Registry.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use dispatch_core::WorkerInfo;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct FleetSummary {
    pub online_count: u64,
    pub total_active_jobs: u32,
    pub total_processed_jobs: u64,
    pub total_failed_jobs: u64,
}

#[derive(Serialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerInfo>,
    pub summary: FleetSummary,
}

pub async fn workers(State(state): State<AppState>) -> ApiResult<Json<WorkersResponse>> {
    let online_ids = state.registry.list_online().await?;
    let workers = state.registry.get_details(&online_ids).await?;

    let summary = FleetSummary {
        online_count: workers.len() as u64,
        total_active_jobs: workers.iter().map(|w| w.active_jobs).sum(),
        total_processed_jobs: workers.iter().map(|w| w.processed_jobs).sum(),
        total_failed_jobs: workers.iter().map(|w| w.failed_jobs).sum(),
    };

    Ok(Json(WorkersResponse { workers, summary }))
}
