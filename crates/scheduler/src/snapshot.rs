//! Snapshot Collector (spec.md §4.6) — the `stats-snapshot-collector`
//! system tick, run as a repeatable job through the same `JobQueue`
//! every other job flows through (single-instance via the Queue's
//! repeatable contract, not a separate cron).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use dispatch_core::{
    compute_jobs_per_min, CoreResult, HeartbeatRegistry, JobQueue, QueueStatsSnapshot, SnapshotStore,
};

/// Snapshots older than this are pruned on every tick (spec.md §4.6 step 6).
const SNAPSHOT_RETENTION: chrono::Duration = chrono::Duration::hours(24);

pub struct SnapshotCollector {
    queue: Arc<dyn JobQueue>,
    registry: Arc<dyn HeartbeatRegistry>,
    store: Arc<dyn SnapshotStore>,
    queue_names: Vec<String>,
}

impl SnapshotCollector {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<dyn HeartbeatRegistry>,
        store: Arc<dyn SnapshotStore>,
        queue_names: Vec<String>,
    ) -> Self {
        Self { queue, registry, store, queue_names }
    }

    /// Runs the six-step tick for every tracked queue. Each queue's
    /// sub-steps are independent; one queue's failure is logged and does
    /// not stop the others or the next tick (spec.md §4.6 "MUST NOT
    /// block... failures are logged and do not stop the next tick").
    pub async fn tick(&self) {
        for queue_name in &self.queue_names {
            if let Err(e) = self.tick_one(queue_name).await {
                warn!(queue = %queue_name, error = %e, "snapshot tick failed");
            }
        }

        let cutoff = Utc::now() - SNAPSHOT_RETENTION;
        for queue_name in &self.queue_names {
            match self.store.prune(cutoff).await {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(queue = %queue_name, removed, "pruned snapshots older than 24h")
                }
                Err(e) => warn!(queue = %queue_name, error = %e, "snapshot prune failed"),
                _ => {}
            }
        }

        if let Err(e) = self.registry.prune_offline().await {
            warn!(error = %e, "failed to prune offline workers");
        }
    }

    async fn tick_one(&self, queue_name: &str) -> CoreResult<()> {
        let counts = self.queue.get_counts(queue_name).await?;
        let online_workers = self.registry.count_online().await?;
        let prior = self.store.most_recent(queue_name).await?;
        let (jobs_per_min, clamped) = compute_jobs_per_min(counts.completed, prior.as_ref().map(|p| p.completed));

        let snapshot = QueueStatsSnapshot {
            queue_name: queue_name.to_string(),
            waiting: counts.waiting,
            active: counts.active,
            delayed: counts.delayed,
            completed: counts.completed,
            failed: counts.failed,
            paused: counts.paused,
            jobs_per_min,
            clamped,
            online_workers,
            timestamp: Utc::now(),
        };
        self.store.insert(snapshot).await?;
        Ok(())
    }

    /// Minimum interval between ticks (spec.md §4.6 "every 60s").
    pub fn tick_interval() -> Duration {
        Duration::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{EnqueueOptions, WorkerInfo};
    use dispatch_testing::{InMemoryHeartbeatRegistry, InMemoryJobQueue, InMemorySnapshotStore};
    use serde_json::json;

    #[tokio::test]
    async fn tick_inserts_a_snapshot_with_computed_rate() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        let store = Arc::new(InMemorySnapshotStore::new());

        queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        registry
            .heartbeat(&WorkerInfo {
                worker_id: "w1".into(),
                queue_name: "cafe-jobs".into(),
                started_at: Utc::now(),
                active_jobs: 0,
                processed_jobs: 0,
                failed_jobs: 0,
            })
            .await
            .unwrap();

        let collector =
            SnapshotCollector::new(queue.clone(), registry, store.clone(), vec!["cafe-jobs".to_string()]);
        collector.tick().await;

        let snap = store.most_recent("cafe-jobs").await.unwrap().unwrap();
        assert_eq!(snap.waiting, 1);
        assert_eq!(snap.online_workers, 1);
        assert_eq!(snap.jobs_per_min, None, "first sample has no prior to diff against");
    }

    #[tokio::test]
    async fn second_tick_computes_a_rate_from_the_prior_sample() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        let store = Arc::new(InMemorySnapshotStore::new());
        let collector =
            SnapshotCollector::new(queue.clone(), registry, store.clone(), vec!["cafe-jobs".to_string()]);

        collector.tick().await;
        let job_id = queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = queue.reserve("cafe-jobs", "w1").await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        queue.ack("cafe-jobs", &job_id, None).await.unwrap();
        collector.tick().await;

        let snap = store.most_recent("cafe-jobs").await.unwrap().unwrap();
        assert_eq!(snap.jobs_per_min, Some(1));
        assert!(!snap.clamped);
    }
}
