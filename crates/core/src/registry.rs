//! `HeartbeatRegistry` — fleet membership and liveness of worker processes
//! (spec.md §4.2), backed by a time-scored set plus TTL'd detail records.
//!
//! Enumerating all keys is forbidden; every lookup below is expressible as
//! a range/count/multi-get against the scored set, matching the Redis
//! sorted-set access pattern in `other_examples/b9ccacef_dimfeld-ergo__queues-lib.rs.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Liveness threshold: a worker is ONLINE iff its heartbeat score is
/// `>= now - ONLINE_THRESHOLD_MS` (spec.md §4.2).
pub const ONLINE_THRESHOLD_MS: i64 = 30_000;

/// Workers write their heartbeat on this period (spec.md §4.2).
pub const HEARTBEAT_PERIOD_MS: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub queue_name: String,
    pub started_at: DateTime<Utc>,
    pub active_jobs: u32,
    pub processed_jobs: u64,
    pub failed_jobs: u64,
}

#[async_trait]
pub trait HeartbeatRegistry: Send + Sync {
    /// Write the liveness score and detail record for `worker_id`.
    async fn heartbeat(&self, info: &WorkerInfo) -> CoreResult<()>;

    /// `rangeByScore[now - ONLINE_THRESHOLD_MS, +inf]`.
    async fn list_online(&self) -> CoreResult<Vec<String>>;

    /// Same range, via count.
    async fn count_online(&self) -> CoreResult<u64>;

    /// Multi-get detail records for the given worker ids.
    async fn get_details(&self, worker_ids: &[String]) -> CoreResult<Vec<WorkerInfo>>;

    /// `removeByScore[-inf, now - ONLINE_THRESHOLD_MS]` on the liveness
    /// set, and delete the corresponding (already-TTL'd) detail records.
    async fn prune_offline(&self) -> CoreResult<u64>;

    /// Remove this worker from both structures (graceful shutdown).
    async fn remove(&self, worker_id: &str) -> CoreResult<()>;
}
