//! `InMemoryHeartbeatRegistry` — mirrors `RedisHeartbeatRegistry`'s
//! liveness-score + TTL'd detail semantics without a Redis dependency.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use dispatch_core::{CoreResult, HeartbeatRegistry, WorkerInfo, ONLINE_THRESHOLD_MS};

#[derive(Default)]
pub struct InMemoryHeartbeatRegistry {
    /// worker_id -> (last_seen_ms, detail)
    workers: Mutex<HashMap<String, (i64, WorkerInfo)>>,
}

impl InMemoryHeartbeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartbeatRegistry for InMemoryHeartbeatRegistry {
    async fn heartbeat(&self, info: &WorkerInfo) -> CoreResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        self.workers.lock().unwrap().insert(info.worker_id.clone(), (now_ms, info.clone()));
        Ok(())
    }

    async fn list_online(&self) -> CoreResult<Vec<String>> {
        let cutoff = Utc::now().timestamp_millis() - ONLINE_THRESHOLD_MS;
        let workers = self.workers.lock().unwrap();
        Ok(workers
            .iter()
            .filter(|(_, (score, _))| *score >= cutoff)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn count_online(&self) -> CoreResult<u64> {
        Ok(self.list_online().await?.len() as u64)
    }

    async fn get_details(&self, worker_ids: &[String]) -> CoreResult<Vec<WorkerInfo>> {
        let workers = self.workers.lock().unwrap();
        Ok(worker_ids
            .iter()
            .filter_map(|id| workers.get(id).map(|(_, info)| info.clone()))
            .collect())
    }

    async fn prune_offline(&self) -> CoreResult<u64> {
        let cutoff = Utc::now().timestamp_millis() - ONLINE_THRESHOLD_MS;
        let mut workers = self.workers.lock().unwrap();
        let before = workers.len();
        workers.retain(|_, (score, _)| *score >= cutoff);
        Ok((before - workers.len()) as u64)
    }

    async fn remove(&self, worker_id: &str) -> CoreResult<()> {
        self.workers.lock().unwrap().remove(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;

    fn info(id: &str) -> WorkerInfo {
        WorkerInfo {
            worker_id: id.to_string(),
            queue_name: "cafe-jobs".to_string(),
            started_at: ChronoUtc::now(),
            active_jobs: 0,
            processed_jobs: 0,
            failed_jobs: 0,
        }
    }

    #[tokio::test]
    async fn heartbeat_visibility_and_pruning() {
        let registry = InMemoryHeartbeatRegistry::new();
        registry.heartbeat(&info("worker-1")).await.unwrap();
        assert_eq!(registry.count_online().await.unwrap(), 1);
        assert!(registry.list_online().await.unwrap().contains(&"worker-1".to_string()));

        {
            let mut workers = registry.workers.lock().unwrap();
            workers.get_mut("worker-1").unwrap().0 = Utc::now().timestamp_millis() - 40_000;
        }
        assert_eq!(registry.count_online().await.unwrap(), 0);
        let pruned = registry.prune_offline().await.unwrap();
        assert_eq!(pruned, 1);
        assert!(registry.get_details(&["worker-1".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn graceful_shutdown_removes_worker() {
        let registry = InMemoryHeartbeatRegistry::new();
        registry.heartbeat(&info("worker-1")).await.unwrap();
        registry.remove("worker-1").await.unwrap();
        assert_eq!(registry.count_online().await.unwrap(), 0);
    }
}
