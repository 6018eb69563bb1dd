//! `GET /dashboard/active-runs` (spec.md §4.10/§6) — the Run-state Reader.
//! Counters are clamped through `AppState::dashboard_cache` so a backend
//! restart never makes the dashboard's numbers go backwards for a Run it
//! has already reported on (spec.md §9 "Async-polling UI contract").

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use dispatch_core::{
    derive_run_status, DerivedRunStatus, JobStatus, RunJobEvent, RunJobResult, ScheduleRun,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// Survives dashboard poll jitter the same way `RunStore::list_active`
/// does (spec.md §4.10 "terminated within the last 30s").
const ACTIVE_RUN_GRACE_SECS: i64 = 30;

/// Bounds how many terminal jobs per Run are scanned for recent events —
/// a Run's job count is bounded by `dailyPostCount`, so this is generous
/// headroom, not a real limit in practice.
const EVENT_SCAN_LIMIT: u64 = 200;

#[derive(Serialize)]
pub struct ScheduleRunInfo {
    pub run_id: String,
    pub schedule_id: String,
    pub user_id: String,
    pub run_date: chrono::NaiveDate,
    pub status: DerivedRunStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub triggered_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize)]
pub struct ActiveRunsResponse {
    pub runs: Vec<ScheduleRunInfo>,
    pub recent_events_by_run_id: HashMap<String, Vec<RunJobEvent>>,
}

fn to_info(run: &ScheduleRun, completed_jobs: u32, failed_jobs: u32) -> ScheduleRunInfo {
    let mut clamped = run.clone();
    clamped.completed_jobs = completed_jobs;
    clamped.failed_jobs = failed_jobs;
    let status = derive_run_status(&clamped, run.started_at.is_some());

    ScheduleRunInfo {
        run_id: run.id.clone(),
        schedule_id: run.schedule_id.clone(),
        user_id: run.user_id.clone(),
        run_date: run.run_date,
        status,
        total_jobs: run.total_jobs,
        completed_jobs,
        failed_jobs,
        triggered_at: run.triggered_at,
        started_at: run.started_at,
        finished_at: run.finished_at,
    }
}

/// Up to 3 most recent terminal job events for `run_id`, newest first.
/// The Queue has no secondary index on `scheduleRunId`, so this scans
/// COMPLETED/FAILED jobs directly — the same bounded-scan tradeoff used
/// throughout this crate (see `routes::control::list_jobs`).
async fn recent_events(state: &AppState, queue_name: &str, run_id: &str) -> ApiResult<Vec<RunJobEvent>> {
    let mut events = Vec::new();
    for status in [JobStatus::Completed, JobStatus::Failed] {
        let jobs = state.queue.list_jobs(queue_name, Some(status), 0, EVENT_SCAN_LIMIT).await?;
        for job in jobs {
            if job.schedule_run_id.as_deref() != Some(run_id) {
                continue;
            }
            events.push(RunJobEvent {
                index: job.sequence_number.unwrap_or(0),
                result: if status == JobStatus::Completed { RunJobResult::Ok } else { RunJobResult::Err },
                error_code: job.error_code,
                created_at: job.finished_at.unwrap_or(job.created_at),
            });
        }
    }
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    events.truncate(3);
    Ok(events)
}

pub async fn active_runs(State(state): State<AppState>) -> ApiResult<Json<ActiveRunsResponse>> {
    let runs = state.run_store.list_active(ACTIVE_RUN_GRACE_SECS).await?;

    let mut infos = Vec::with_capacity(runs.len());
    let mut recent_events_by_run_id = HashMap::new();

    for run in &runs {
        let (completed_jobs, failed_jobs) =
            state.dashboard_cache.clamp(&run.id, run.completed_jobs, run.failed_jobs);
        infos.push(to_info(run, completed_jobs, failed_jobs));

        for queue_name in state.queue_names.iter() {
            let events = recent_events(&state, queue_name, &run.id).await?;
            if !events.is_empty() {
                recent_events_by_run_id.insert(run.id.clone(), events);
                break;
            }
        }
    }

    Ok(Json(ActiveRunsResponse { runs: infos, recent_events_by_run_id }))
}
