//! In-memory stand-ins for the four Postgres-backed relational stores,
//! used the same way the teacher's `seesaw-testing` crate backs the rest
//! of the workspace's tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use dispatch_core::{
    AuditFilter, AuditLogEntry, AuditStore, Incident, IncidentStatus, IncidentStore, IncidentType,
    QueueStatsSnapshot, RunStatus, RunStore, ScheduleRun, Severity, SnapshotStore,
};
use dispatch_core::{CoreError, CoreResult};

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<String, ScheduleRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_or_get_open(
        &self,
        schedule_id: &str,
        user_id: &str,
        run_date: NaiveDate,
        total_jobs: u32,
    ) -> CoreResult<(ScheduleRun, bool)> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(existing) = runs.values().find(|r| {
            r.schedule_id == schedule_id
                && r.run_date == run_date
                && !matches!(r.status, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
        }) {
            return Ok((existing.clone(), false));
        }
        let run = ScheduleRun {
            id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.to_string(),
            user_id: user_id.to_string(),
            run_date,
            status: RunStatus::Pending,
            total_jobs,
            completed_jobs: 0,
            failed_jobs: 0,
            triggered_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        runs.insert(run.id.clone(), run.clone());
        Ok((run, true))
    }

    async fn get(&self, run_id: &str) -> CoreResult<Option<ScheduleRun>> {
        Ok(self.runs.lock().unwrap().get(run_id).cloned())
    }

    async fn bump_completed(&self, run_id: &str) -> CoreResult<ScheduleRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
        run.completed_jobs += 1;
        run.status = RunStatus::Running;
        Ok(run.clone())
    }

    async fn bump_failed(&self, run_id: &str) -> CoreResult<ScheduleRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
        run.failed_jobs += 1;
        run.status = RunStatus::Running;
        Ok(run.clone())
    }

    async fn mark_started(&self, run_id: &str) -> CoreResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
        if run.started_at.is_none() {
            run.started_at = Some(Utc::now());
            run.status = RunStatus::Running;
        }
        Ok(())
    }

    async fn mark_finished(&self, run_id: &str, status: RunStatus) -> CoreResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| CoreError::NotFound(format!("run {run_id}")))?;
        run.status = status;
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn list_active(&self, grace_secs: i64) -> CoreResult<Vec<ScheduleRun>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_secs);
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .filter(|r| {
                !matches!(r.status, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
                    || r.finished_at.map(|f| f >= cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySnapshotStore {
    /// queue_name -> snapshots, oldest first.
    snapshots: Mutex<HashMap<String, Vec<QueueStatsSnapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn insert(&self, snapshot: QueueStatsSnapshot) -> CoreResult<()> {
        self.snapshots
            .lock()
            .unwrap()
            .entry(snapshot.queue_name.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn most_recent(&self, queue_name: &str) -> CoreResult<Option<QueueStatsSnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(queue_name).and_then(|v| v.last().cloned()))
    }

    async fn recent(&self, queue_name: &str, n: u64) -> CoreResult<Vec<QueueStatsSnapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        let all = snapshots.get(queue_name).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(n as usize);
        Ok(all[start..].to_vec())
    }

    async fn since(&self, queue_name: &str, since: DateTime<Utc>) -> CoreResult<Vec<QueueStatsSnapshot>> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .get(queue_name)
            .map(|v| v.iter().filter(|s| s.timestamp >= since).cloned().collect())
            .unwrap_or_default())
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> CoreResult<u64> {
        let mut snapshots = self.snapshots.lock().unwrap();
        let mut removed = 0u64;
        for bucket in snapshots.values_mut() {
            let before = bucket.len();
            bucket.retain(|s| s.timestamp >= older_than);
            removed += (before - bucket.len()) as u64;
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryIncidentStore {
    incidents: Mutex<HashMap<String, Incident>>,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    async fn find_open(
        &self,
        incident_type: IncidentType,
        queue_name: Option<&str>,
    ) -> CoreResult<Option<Incident>> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents
            .values()
            .find(|i| {
                i.incident_type == incident_type
                    && i.queue_name.as_deref() == queue_name
                    && i.status != IncidentStatus::Resolved
            })
            .cloned())
    }

    async fn insert(&self, incident: Incident) -> CoreResult<Incident> {
        self.incidents.lock().unwrap().insert(incident.id.clone(), incident.clone());
        Ok(incident)
    }

    // Severity is fixed at `insert` time; a re-observation only moves
    // `affected_jobs`/`updated_at` (spec.md §9 "one-shot" escalation).
    async fn update_observation(&self, id: &str, affected_jobs: u64) -> CoreResult<()> {
        let mut incidents = self.incidents.lock().unwrap();
        let incident = incidents.get_mut(id).ok_or_else(|| CoreError::NotFound(format!("incident {id}")))?;
        incident.affected_jobs = affected_jobs;
        incident.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: IncidentStatus,
        resolved_by: Option<&str>,
    ) -> CoreResult<Incident> {
        let mut incidents = self.incidents.lock().unwrap();
        let incident = incidents.get_mut(id).ok_or_else(|| CoreError::NotFound(format!("incident {id}")))?;
        incident.status = status;
        if status == IncidentStatus::Resolved {
            incident.resolved_at = Some(Utc::now());
            incident.resolved_by = resolved_by.map(|s| s.to_string());
        }
        Ok(incident.clone())
    }

    async fn list(&self, status: Option<IncidentStatus>) -> CoreResult<Vec<Incident>> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents
            .values()
            .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Incident>> {
        Ok(self.incidents.lock().unwrap().get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only convenience: count entries matching `action`, used by the
    /// pause-idempotence property (spec.md §8 property 4).
    pub fn count_action(&self, entity_id: &str, action: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.entity_id == entity_id && e.action == action)
            .count()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> CoreResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list(&self, filter: AuditFilter, offset: u64, limit: u64) -> CoreResult<Vec<AuditLogEntry>> {
        let entries = self.entries.lock().unwrap();
        let filtered: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|e| filter.entity_type.as_deref().map(|t| t == e.entity_type).unwrap_or(true))
            .filter(|e| filter.entity_id.as_deref().map(|id| id == e.entity_id).unwrap_or(true))
            .filter(|e| filter.actor_id.as_deref() == e.actor_id.as_deref() || filter.actor_id.is_none())
            .filter(|e| filter.action.as_deref().map(|a| a == e.action).unwrap_or(true))
            .filter(|e| filter.since.map(|s| e.created_at >= s).unwrap_or(true))
            .filter(|e| filter.until.map(|u| e.created_at <= u).unwrap_or(true))
            .cloned()
            .collect();
        Ok(filtered.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_counters_and_derived_terminal_state() {
        let store = InMemoryRunStore::new();
        let (run, created) = store
            .create_or_get_open("sched-1", "user-1", Utc::now().date_naive(), 3)
            .await
            .unwrap();
        assert!(created);
        let (_, created_again) = store
            .create_or_get_open("sched-1", "user-1", run.run_date, 3)
            .await
            .unwrap();
        assert!(!created_again, "no duplicate open run for the same (schedule, date)");

        store.mark_started(&run.id).await.unwrap();
        store.bump_completed(&run.id).await.unwrap();
        store.bump_completed(&run.id).await.unwrap();
        let after = store.bump_failed(&run.id).await.unwrap();
        assert_eq!(after.completed_jobs + after.failed_jobs, after.total_jobs);
    }

    #[tokio::test]
    async fn incident_dedup_by_type_and_queue() {
        let store = InMemoryIncidentStore::new();
        let incident = Incident {
            id: Uuid::new_v4().to_string(),
            incident_type: IncidentType::QueueBacklog,
            severity: Severity::High,
            queue_name: Some("cafe-jobs".into()),
            title: "t".into(),
            description: None,
            recommended_action: None,
            affected_jobs: 250,
            status: IncidentStatus::Active,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        store.insert(incident.clone()).await.unwrap();
        let found = store
            .find_open(IncidentType::QueueBacklog, Some("cafe-jobs"))
            .await
            .unwrap();
        assert!(found.is_some());

        store.update_observation(&incident.id, 300).await.unwrap();
        let found = store.find_open(IncidentType::QueueBacklog, Some("cafe-jobs")).await.unwrap().unwrap();
        assert_eq!(found.affected_jobs, 300);
        assert_eq!(found.severity, Severity::High, "severity must not change on re-observation");

        store.set_status(&incident.id, IncidentStatus::Resolved, Some("system")).await.unwrap();
        let found = store.find_open(IncidentType::QueueBacklog, Some("cafe-jobs")).await.unwrap();
        assert!(found.is_none(), "resolved incidents are no longer open");
    }
}
