//! Relational-store traits for the entities canonical in Postgres
//! (`ScheduleRun`, `QueueStatsSnapshot`, `Incident`, `AuditLogEntry` — see
//! the storage-resolution note in SPEC_FULL.md §3).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::audit::{AuditFilter, AuditLogEntry};
use crate::error::CoreResult;
use crate::incident::{Incident, IncidentStatus, IncidentType};
use crate::run::{RunStatus, ScheduleRun};
use crate::snapshot::QueueStatsSnapshot;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new Run, or return the existing non-terminal Run for
    /// `(schedule_id, run_date)` unchanged (spec.md §3 "at most one
    /// non-terminal Run per (scheduleId, runDate)").
    async fn create_or_get_open(
        &self,
        schedule_id: &str,
        user_id: &str,
        run_date: NaiveDate,
        total_jobs: u32,
    ) -> CoreResult<(ScheduleRun, bool)>;

    async fn get(&self, run_id: &str) -> CoreResult<Option<ScheduleRun>>;

    /// Atomic single-row increment, guarding against lost updates when
    /// multiple child jobs terminate concurrently (spec.md §5).
    async fn bump_completed(&self, run_id: &str) -> CoreResult<ScheduleRun>;
    async fn bump_failed(&self, run_id: &str) -> CoreResult<ScheduleRun>;

    async fn mark_started(&self, run_id: &str) -> CoreResult<()>;
    async fn mark_finished(&self, run_id: &str, status: RunStatus) -> CoreResult<()>;

    /// All non-terminal Runs, plus Runs that terminated within the last
    /// `grace_secs` seconds (spec.md §4.10 dashboard poll-jitter survival).
    async fn list_active(&self, grace_secs: i64) -> CoreResult<Vec<ScheduleRun>>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert(&self, snapshot: QueueStatsSnapshot) -> CoreResult<()>;

    async fn most_recent(&self, queue_name: &str) -> CoreResult<Option<QueueStatsSnapshot>>;

    /// The most recent `n` snapshots for `queue_name`, oldest first.
    async fn recent(&self, queue_name: &str, n: u64) -> CoreResult<Vec<QueueStatsSnapshot>>;

    /// Snapshots for `queue_name` with `timestamp >= since`, oldest first.
    async fn since(
        &self,
        queue_name: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<QueueStatsSnapshot>>;

    /// Delete snapshots older than `older_than` (retention, spec.md §4.6).
    async fn prune(&self, older_than: DateTime<Utc>) -> CoreResult<u64>;
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// The open (non-resolved) Incident for `(type, queue_name)`, if any —
    /// the de-duplication key (spec.md §3).
    async fn find_open(
        &self,
        incident_type: IncidentType,
        queue_name: Option<&str>,
    ) -> CoreResult<Option<Incident>>;

    async fn insert(&self, incident: Incident) -> CoreResult<Incident>;

    /// Re-observing an already-open Incident bumps `affected_jobs` and
    /// `updated_at` only. Severity is set once at `insert` time and never
    /// revised by a later observation — spec.md §9 notes severity
    /// escalation is one-shot in the source ("HIGH stays HIGH"); this is
    /// the same behavior preserved, not a bug to silently fix.
    async fn update_observation(&self, id: &str, affected_jobs: u64) -> CoreResult<()>;

    async fn set_status(
        &self,
        id: &str,
        status: IncidentStatus,
        resolved_by: Option<&str>,
    ) -> CoreResult<Incident>;

    async fn list(&self, status: Option<IncidentStatus>) -> CoreResult<Vec<Incident>>;

    async fn get(&self, id: &str) -> CoreResult<Option<Incident>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Write failures are logged by the caller and swallowed — the
    /// business outcome this entry records is never rolled back (spec.md
    /// §4.9).
    async fn append(&self, entry: AuditLogEntry) -> CoreResult<()>;

    async fn list(&self, filter: AuditFilter, offset: u64, limit: u64) -> CoreResult<Vec<AuditLogEntry>>;
}
