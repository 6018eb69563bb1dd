//! `GET /overview`, `GET /queues`, `GET /queues/:name/trend` (spec.md §6).

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use dispatch_core::{JobCounts, QueueStatsSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct QueueSummary {
    pub queue_name: String,
    #[serde(flatten)]
    pub counts: JobCounts,
}

#[derive(Serialize)]
pub struct OverviewResponse {
    pub queues: Vec<QueueSummary>,
    pub online_workers: u64,
    pub active_incidents: u64,
}

/// KPI snapshot across every tracked queue, the landing view for the
/// admin dashboard (spec.md §6 `GET /overview`).
pub async fn overview(State(state): State<AppState>) -> ApiResult<Json<OverviewResponse>> {
    let mut queues = Vec::with_capacity(state.queue_names.len());
    for name in state.queue_names.iter() {
        let counts = state.queue.get_counts(name).await?;
        queues.push(QueueSummary { queue_name: name.clone(), counts });
    }
    let online_workers = state.registry.count_online().await?;
    let active_incidents = state.incident_store.list(Some(dispatch_core::IncidentStatus::Active)).await?.len() as u64;

    Ok(Json(OverviewResponse { queues, online_workers, active_incidents }))
}

/// `GET /queues` — per-queue counts, same shape as one row of `overview`.
pub async fn list_queues(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueSummary>>> {
    let mut queues = Vec::with_capacity(state.queue_names.len());
    for name in state.queue_names.iter() {
        let counts = state.queue.get_counts(name).await?;
        queues.push(QueueSummary { queue_name: name.clone(), counts });
    }
    Ok(Json(queues))
}

#[derive(Deserialize)]
pub struct TrendQuery {
    hours: Option<i64>,
}

/// `GET /queues/:name/trend?hours=h` — the snapshot time series backing
/// the dashboard's trend chart.
pub async fn trend(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<TrendQuery>,
) -> ApiResult<Json<Vec<QueueStatsSnapshot>>> {
    if !state.known_queue(&name) {
        return Err(ApiError::NotFound(format!("queue {name} not found")));
    }
    let hours = q.hours.unwrap_or(24);
    if hours <= 0 {
        return Err(ApiError::Validation("hours must be positive".to_string()));
    }
    let since = Utc::now() - chrono::Duration::hours(hours);
    let snapshots = state.snapshot_store.since(&name, since).await?;
    Ok(Json(snapshots))
}
