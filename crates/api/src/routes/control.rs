//! The mutating half of the queue control plane (spec.md §4.8/§6): pause,
//! resume, retry-failed, drain, clean, and the per-job retry/cancel pair,
//! plus the read-only job list/detail endpoints they sit next to.
//!
//! Every mutating handler here follows the same shape: perform the
//! operation, then append an `AuditLogEntry` — "write an AuditLogEntry
//! before returning success" (spec.md §4.8) — before answering the
//! request. Audit-write failures are logged and swallowed per §4.9; they
//! never turn a successful operation into an error response.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dispatch_core::{ActorType, AuditLogEntry, Job, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AdminPrincipal;
use crate::state::AppState;

/// A manual scan over `list_jobs` is bounded to this many rows per status
/// — the same ceiling `dispatch-scheduler`'s `duplicate_exists` uses for
/// its own unindexed scans (see `crates/scheduler/src/planner.rs`).
const SCAN_LIMIT: u64 = 1000;

fn parse_status(s: &str) -> ApiResult<JobStatus> {
    serde_json::from_value(Value::String(s.to_uppercase()))
        .map_err(|_| ApiError::Validation(format!("unknown job status {s}")))
}

async fn append_audit(state: &AppState, entry: AuditLogEntry) {
    let entity = entry.entity_id.clone();
    let action = entry.action.clone();
    if let Err(e) = state.audit.append(entry).await {
        tracing::warn!(entity_id = %entity, action = %action, error = %e, "audit write failed");
    }
}

fn require_known_queue(state: &AppState, name: &str) -> ApiResult<()> {
    if state.known_queue(name) {
        Ok(())
    } else {
        Err(ApiError::NotFound(format!("queue {name} not found")))
    }
}

#[derive(Deserialize, Default)]
pub struct ReasonBody {
    reason: Option<String>,
}

fn parse_json_body<T>(bytes: &[u8]) -> ApiResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))
}

pub async fn pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    require_known_queue(&state, &name)?;
    let body: ReasonBody = parse_json_body(&body)?;

    let counts = state.queue.get_counts(&name).await?;
    if counts.paused {
        return Err(ApiError::Conflict(format!("queue {name} is already paused")));
    }
    state.queue.pause(&name).await?;

    let mut entry = AuditLogEntry::new(ActorType::Admin, "queue", &name, "PAUSE").with_actor(principal.actor_id);
    if let Some(reason) = body.reason {
        entry = entry.with_reason(reason);
    }
    append_audit(&state, entry).await;

    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn resume(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    require_known_queue(&state, &name)?;
    let body: ReasonBody = parse_json_body(&body)?;

    let counts = state.queue.get_counts(&name).await?;
    if !counts.paused {
        return Err(ApiError::Conflict(format!("queue {name} is not paused")));
    }
    state.queue.resume(&name).await?;

    let mut entry = AuditLogEntry::new(ActorType::Admin, "queue", &name, "RESUME").with_actor(principal.actor_id);
    if let Some(reason) = body.reason {
        entry = entry.with_reason(reason);
    }
    append_audit(&state, entry).await;

    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Serialize)]
pub struct MovedCount {
    moved_count: u64,
}

/// `POST /queues/:name/retry-failed` — idempotent because retried jobs
/// keep their `jobId` (spec.md §4.8).
pub async fn retry_failed(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
) -> ApiResult<Json<MovedCount>> {
    require_known_queue(&state, &name)?;
    let moved_count = state.queue.retry_failed(&name).await?;

    let entry = AuditLogEntry::new(ActorType::Admin, "queue", &name, "RETRY_FAILED")
        .with_actor(principal.actor_id)
        .with_values(None, Some(serde_json::json!({"movedCount": moved_count})));
    append_audit(&state, entry).await;

    Ok(Json(MovedCount { moved_count }))
}

#[derive(Deserialize, Default)]
pub struct ConfirmBody {
    confirm: Option<String>,
}

#[derive(Serialize)]
pub struct RemovedCount {
    removed_count: u64,
}

/// `DELETE /queues/:name/drain` — requires `{confirm: name}` (spec.md
/// §4.8 dangerous-operation token).
pub async fn drain(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(principal): Extension<AdminPrincipal>,
    body: axum::body::Bytes,
) -> ApiResult<Json<RemovedCount>> {
    require_known_queue(&state, &name)?;
    let body: ConfirmBody = parse_json_body(&body)?;
    if body.confirm.as_deref() != Some(name.as_str()) {
        return Err(ApiError::Validation("confirm must equal the queue name".to_string()));
    }

    let removed_count = state.queue.drain(&name).await?;

    let entry = AuditLogEntry::new(ActorType::Admin, "queue", &name, "DRAIN")
        .with_actor(principal.actor_id)
        .with_values(None, Some(serde_json::json!({"removedCount": removed_count})));
    append_audit(&state, entry).await;

    Ok(Json(RemovedCount { removed_count }))
}

#[derive(Deserialize)]
pub struct CleanQuery {
    status: String,
    limit: Option<u64>,
}

/// `DELETE /queues/:name/clean?status=&limit=` — requires the literal
/// `{confirm: "clean"}` (spec.md §4.8).
pub async fn clean(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<CleanQuery>,
    Extension(principal): Extension<AdminPrincipal>,
    body: axum::body::Bytes,
) -> ApiResult<Json<RemovedCount>> {
    require_known_queue(&state, &name)?;
    let body: ConfirmBody = parse_json_body(&body)?;
    if body.confirm.as_deref() != Some("clean") {
        return Err(ApiError::Validation("confirm must be the literal \"clean\"".to_string()));
    }
    let status = parse_status(&q.status)?;
    let limit = q.limit.unwrap_or(1000);

    let removed_count = state.queue.clean(&name, status, limit).await?;

    let entry = AuditLogEntry::new(ActorType::Admin, "queue", &name, "CLEAN")
        .with_actor(principal.actor_id)
        .with_values(None, Some(serde_json::json!({"status": q.status, "removedCount": removed_count})));
    append_audit(&state, entry).await;

    Ok(Json(RemovedCount { removed_count }))
}

#[derive(Deserialize)]
pub struct JobsQuery {
    status: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// `GET /queues/:name/jobs?status=&start=&end=` — the Queue has no
/// secondary index on `created_at`, so the time window is applied after a
/// bounded scan, the same tradeoff `SchedulePlanner::duplicate_exists`
/// makes for its own payload-field filters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<JobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    require_known_queue(&state, &name)?;
    let status = q.status.as_deref().map(parse_status).transpose()?;

    let jobs = state.queue.list_jobs(&name, status, 0, SCAN_LIMIT).await?;
    let jobs = jobs
        .into_iter()
        .filter(|j| q.start.map(|s| j.created_at >= s).unwrap_or(true))
        .filter(|j| q.end.map(|e| j.created_at <= e).unwrap_or(true))
        .collect();
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path((name, job_id)): Path<(String, String)>,
) -> ApiResult<Json<Job>> {
    require_known_queue(&state, &name)?;
    let job = state
        .queue
        .get_job(&name, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))?;
    Ok(Json(job))
}

/// `POST /queues/:name/jobs/:jobId/retry` — single-job counterpart to
/// `retry-failed`; 409 if the job isn't currently FAILED.
pub async fn retry_job(
    State(state): State<AppState>,
    Path((name, job_id)): Path<(String, String)>,
    Extension(principal): Extension<AdminPrincipal>,
) -> ApiResult<Json<Value>> {
    require_known_queue(&state, &name)?;
    state.queue.retry_job(&name, &job_id).await?;

    let entry = AuditLogEntry::new(ActorType::Admin, "job", &job_id, "RETRY").with_actor(principal.actor_id);
    append_audit(&state, entry).await;

    Ok(Json(serde_json::json!({"ok": true})))
}

/// `POST /queues/:name/jobs/:jobId/cancel` — 404 if missing, 409 if
/// already terminal (cancelling a terminal job is a conflict, not a no-op).
pub async fn cancel_job(
    State(state): State<AppState>,
    Path((name, job_id)): Path<(String, String)>,
    Extension(principal): Extension<AdminPrincipal>,
) -> ApiResult<Json<Value>> {
    require_known_queue(&state, &name)?;
    let job = state
        .queue
        .get_job(&name, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))?;
    if job.status.is_terminal() {
        return Err(ApiError::Conflict(format!("job {job_id} is already {:?}", job.status)));
    }

    state.queue.cancel(&name, &job_id).await?;

    let entry = AuditLogEntry::new(ActorType::Admin, "job", &job_id, "CANCEL").with_actor(principal.actor_id);
    append_audit(&state, entry).await;

    Ok(Json(serde_json::json!({"ok": true})))
}
