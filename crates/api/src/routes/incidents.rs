//! `GET /incidents`, `POST /incidents/:id/acknowledge`, `POST
//! /incidents/:id/resolve` (spec.md §6) — manual transitions delegate to
//! `dispatch_scheduler::IncidentDetector`, which already owns the
//! audit-write side of these transitions (see `crates/scheduler/src/incident.rs`).
//! This layer's own job is just the HTTP-level 404/409 contract the
//! detector's `CoreError::NotFound`-only signature doesn't express on its
//! own.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dispatch_core::{Incident, IncidentStatus};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AdminPrincipal;
use crate::state::AppState;

fn parse_incident_status(s: &str) -> ApiResult<IncidentStatus> {
    serde_json::from_value(Value::String(s.to_uppercase()))
        .map_err(|_| ApiError::Validation(format!("unknown incident status {s}")))
}

#[derive(Deserialize)]
pub struct IncidentsQuery {
    status: Option<String>,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<IncidentsQuery>,
) -> ApiResult<Json<Vec<Incident>>> {
    let status = q.status.as_deref().map(parse_incident_status).transpose()?;
    let incidents = state.incident_store.list(status).await?;
    Ok(Json(incidents))
}

async fn get_or_404(state: &AppState, id: &str) -> ApiResult<Incident> {
    state
        .incident_store
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("incident {id} not found")))
}

/// 409 if the incident is already acknowledged or resolved — acknowledging
/// twice is a conflict, unlike `retry-failed`'s deliberate idempotence.
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
) -> ApiResult<Json<Value>> {
    let incident = get_or_404(&state, &id).await?;
    if incident.status != IncidentStatus::Active {
        return Err(ApiError::Conflict(format!("incident {id} is already {:?}", incident.status)));
    }

    state.incident_detector.acknowledge(&id, &principal.actor_id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize, Default)]
pub struct ResolveBody {
    reason: Option<String>,
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    get_or_404(&state, &id).await?;
    let body: ResolveBody = if body.is_empty() {
        ResolveBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))?
    };

    state.incident_detector.resolve(&id, &principal.actor_id, body.reason).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
