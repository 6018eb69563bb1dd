//! Incident Detector (spec.md §4.7) — runs the pure rule functions in
//! `dispatch_core::incident` against recent snapshot windows, owns the
//! de-duplication/auto-resolve orchestration the pure rules intentionally
//! leave out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use dispatch_core::{
    detect_high_failure_rate, detect_queue_backlog, detect_worker_down, ActorType, AuditLogEntry,
    AuditStore, CoreResult, DetectedCondition, Incident, IncidentStatus, IncidentStore, SnapshotStore,
    AUTO_RESOLVE_AFTER_SECS,
};

pub struct IncidentDetector {
    snapshots: Arc<dyn SnapshotStore>,
    incidents: Arc<dyn IncidentStore>,
    audit: Arc<dyn AuditStore>,
    queue_names: Vec<String>,
}

impl IncidentDetector {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        incidents: Arc<dyn IncidentStore>,
        audit: Arc<dyn AuditStore>,
        queue_names: Vec<String>,
    ) -> Self {
        Self { snapshots, incidents, audit, queue_names }
    }

    pub async fn tick(&self) {
        for queue_name in &self.queue_names {
            if let Err(e) = self.tick_one(queue_name).await {
                warn!(queue = %queue_name, error = %e, "incident detection failed");
            }
        }

        match self.auto_resolve_stale().await {
            Ok(resolved) if resolved > 0 => info!(resolved, "auto-resolved stale incidents"),
            Err(e) => warn!(error = %e, "auto-resolve pass failed"),
            _ => {}
        }
    }

    async fn tick_one(&self, queue_name: &str) -> CoreResult<()> {
        let backlog_window = self.snapshots.recent(queue_name, 5).await?;
        let failure_window = self.snapshots.since(queue_name, Utc::now() - chrono::Duration::minutes(30)).await?;
        let worker_window = self.snapshots.recent(queue_name, 2).await?;

        let conditions = [
            detect_queue_backlog(&backlog_window),
            detect_high_failure_rate(&failure_window),
            detect_worker_down(&worker_window),
        ];

        for maybe_condition in conditions {
            self.reconcile(queue_name, maybe_condition).await?;
        }
        Ok(())
    }

    /// One rule's outcome against the open Incident it would de-duplicate
    /// with, if any: firing updates-or-opens, not-firing auto-resolves an
    /// open Incident once it has been quiet for
    /// [`dispatch_core::AUTO_RESOLVE_AFTER_SECS`].
    async fn reconcile(&self, queue_name: &str, condition: Option<DetectedCondition>) -> CoreResult<()> {
        let c = match condition {
            Some(c) => c,
            None => return Ok(()),
        };

        let open = self.incidents.find_open(c.incident_type, Some(queue_name)).await?;
        match open {
            Some(existing) => {
                // Severity is fixed at open time (spec.md §9 "one-shot" —
                // preserved here, not overwritten on every re-observation);
                // only the observed magnitude and freshness move.
                self.incidents.update_observation(&existing.id, c.affected_jobs).await?;
            }
            None => {
                let incident = Incident {
                    id: uuid::Uuid::new_v4().to_string(),
                    incident_type: c.incident_type,
                    severity: c.severity,
                    queue_name: Some(queue_name.to_string()),
                    title: c.title,
                    description: Some(c.description),
                    recommended_action: Some(c.recommended_action),
                    affected_jobs: c.affected_jobs,
                    status: IncidentStatus::Active,
                    started_at: Utc::now(),
                    updated_at: Utc::now(),
                    resolved_at: None,
                    resolved_by: None,
                };
                let incident = self.incidents.insert(incident).await?;
                info!(incident_id = %incident.id, incident_type = ?incident.incident_type, queue = %queue_name, "incident opened");
            }
        }
        Ok(())
    }

    /// Operator-triggered transition (spec.md §4.7 "Manual transitions").
    pub async fn acknowledge(&self, incident_id: &str, actor_id: &str) -> CoreResult<Incident> {
        let incident = self.incidents.set_status(incident_id, IncidentStatus::Acknowledged, None).await?;
        let entry = AuditLogEntry::new(ActorType::Admin, "incident", incident_id, "ACKNOWLEDGE")
            .with_actor(actor_id);
        if let Err(e) = self.audit.append(entry).await {
            warn!(incident_id = %incident_id, error = %e, "failed to record acknowledge audit entry");
        }
        Ok(incident)
    }

    pub async fn resolve(&self, incident_id: &str, actor_id: &str, reason: Option<String>) -> CoreResult<Incident> {
        let incident =
            self.incidents.set_status(incident_id, IncidentStatus::Resolved, Some(actor_id)).await?;
        let mut entry = AuditLogEntry::new(ActorType::Admin, "incident", incident_id, "RESOLVE")
            .with_actor(actor_id);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        if let Err(e) = self.audit.append(entry).await {
            warn!(incident_id = %incident_id, error = %e, "failed to record resolve audit entry");
        }
        Ok(incident)
    }

    /// Runs after `tick()`: any open Incident whose condition stopped
    /// firing auto-resolves once `updated_at` has been quiet for
    /// `AUTO_RESOLVE_AFTER_SECS` (spec.md §4.7) — a rule that's still
    /// firing keeps bumping `updated_at` via `update_observation`, so this
    /// never has to know which rule produced which incident.
    pub async fn auto_resolve_stale(&self) -> CoreResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(AUTO_RESOLVE_AFTER_SECS);
        let mut resolved = 0u64;
        for status in [IncidentStatus::Active, IncidentStatus::Acknowledged] {
            let open = self.incidents.list(Some(status)).await?;
            for incident in open {
                if incident.updated_at > cutoff {
                    continue;
                }
                self.incidents.set_status(&incident.id, IncidentStatus::Resolved, Some("system")).await?;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    pub fn tick_interval() -> Duration {
        Duration::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::QueueStatsSnapshot;
    use dispatch_testing::{InMemoryAuditStore, InMemoryIncidentStore, InMemorySnapshotStore};

    fn snap(waiting: u64, minute: i64) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            queue_name: "cafe-jobs".into(),
            waiting,
            active: 0,
            delayed: 0,
            completed: 0,
            failed: 0,
            paused: false,
            jobs_per_min: Some(0),
            clamped: false,
            online_workers: 2,
            timestamp: Utc::now() + chrono::Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn backlog_opens_exactly_one_incident_across_repeated_ticks() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        for i in 0..3 {
            snapshots.insert(snap(250, i)).await.unwrap();
        }
        let incidents = Arc::new(InMemoryIncidentStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let detector =
            IncidentDetector::new(snapshots.clone(), incidents.clone(), audit, vec!["cafe-jobs".to_string()]);

        detector.tick().await;
        detector.tick().await;

        let open = incidents.list(Some(IncidentStatus::Active)).await.unwrap();
        assert_eq!(open.len(), 1, "repeated firing must not open duplicate incidents");
    }

    #[tokio::test]
    async fn severity_does_not_escalate_on_re_observation() {
        use dispatch_core::Severity;

        let snapshots = Arc::new(InMemorySnapshotStore::new());
        for i in 0..5 {
            snapshots.insert(snap(150, i)).await.unwrap();
        }
        let incidents = Arc::new(InMemoryIncidentStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let detector =
            IncidentDetector::new(snapshots.clone(), incidents.clone(), audit, vec!["cafe-jobs".to_string()]);

        detector.tick().await;
        let opened = incidents.list(Some(IncidentStatus::Active)).await.unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].severity, Severity::Medium);

        // waiting climbs past the HIGH threshold for 3 consecutive snapshots.
        for i in 5..8 {
            snapshots.insert(snap(250, i)).await.unwrap();
        }
        detector.tick().await;

        let open = incidents.list(Some(IncidentStatus::Active)).await.unwrap();
        assert_eq!(open.len(), 1, "the worsening condition must not open a second incident");
        assert_eq!(
            open[0].severity,
            Severity::Medium,
            "severity is one-shot (spec.md §9) and must not escalate from a later observation"
        );
        assert_eq!(open[0].affected_jobs, 250, "affected_jobs still tracks the latest observation");
    }

    #[tokio::test]
    async fn acknowledge_and_resolve_are_audited() {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        for i in 0..3 {
            snapshots.insert(snap(250, i)).await.unwrap();
        }
        let incidents = Arc::new(InMemoryIncidentStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let detector =
            IncidentDetector::new(snapshots, incidents.clone(), audit.clone(), vec!["cafe-jobs".to_string()]);
        detector.tick().await;

        let incident = incidents.list(Some(IncidentStatus::Active)).await.unwrap().into_iter().next().unwrap();
        detector.acknowledge(&incident.id, "admin-1").await.unwrap();
        assert_eq!(audit.count_action(&incident.id, "ACKNOWLEDGE"), 1);

        detector.resolve(&incident.id, "admin-1", Some("fixed".to_string())).await.unwrap();
        assert_eq!(audit.count_action(&incident.id, "RESOLVE"), 1);
        let resolved = incidents.get(&incident.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
    }
}
