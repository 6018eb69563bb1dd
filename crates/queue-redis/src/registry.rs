//! `RedisHeartbeatRegistry` — fleet membership backed by a single liveness
//! zset plus one TTL'd detail hash per worker, namespaced under
//! `djq:workers:*` (global, not per-queue — a worker fleet spans queues).
//!
//! Same ZSCORE/ZRANGEBYSCORE access pattern as the job zsets in `queue.rs`,
//! grounded on `other_examples/b9ccacef_dimfeld-ergo__queues-lib.rs.rs`.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use dispatch_core::{CoreResult, HeartbeatRegistry, WorkerInfo, ONLINE_THRESHOLD_MS};

use crate::error::map_redis_err;

const HEARTBEAT_ZSET: &str = "djq:workers:heartbeat";
const DETAIL_PREFIX: &str = "djq:workers:detail:";

/// Detail hashes outlive a single missed heartbeat but not an abandoned
/// process — generous relative to `HEARTBEAT_PERIOD_MS` so a GC sweep of
/// the zset (`prune_offline`) and the hash TTL converge within seconds of
/// each other.
const DETAIL_TTL_SECS: i64 = 120;

fn detail_key(worker_id: &str) -> String {
    format!("{DETAIL_PREFIX}{worker_id}")
}

#[derive(Clone)]
pub struct RedisHeartbeatRegistry {
    conn: ConnectionManager,
}

impl RedisHeartbeatRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl HeartbeatRegistry for RedisHeartbeatRegistry {
    async fn heartbeat(&self, info: &WorkerInfo) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let key = detail_key(&info.worker_id);

        redis::pipe()
            .zadd(HEARTBEAT_ZSET, &info.worker_id, now_ms)
            .ignore()
            .hset_multiple(
                &key,
                &[
                    ("queue_name", info.queue_name.clone()),
                    ("started_at", info.started_at.timestamp_millis().to_string()),
                    ("active_jobs", info.active_jobs.to_string()),
                    ("processed_jobs", info.processed_jobs.to_string()),
                    ("failed_jobs", info.failed_jobs.to_string()),
                ],
            )
            .ignore()
            .expire(&key, DETAIL_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn list_online(&self) -> CoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let cutoff = Utc::now().timestamp_millis() - ONLINE_THRESHOLD_MS;
        let ids: Vec<String> = conn
            .zrangebyscore(HEARTBEAT_ZSET, cutoff, "+inf")
            .await
            .map_err(map_redis_err)?;
        Ok(ids)
    }

    async fn count_online(&self) -> CoreResult<u64> {
        let mut conn = self.conn.clone();
        let cutoff = Utc::now().timestamp_millis() - ONLINE_THRESHOLD_MS;
        let count: u64 = conn
            .zcount(HEARTBEAT_ZSET, cutoff, "+inf")
            .await
            .map_err(map_redis_err)?;
        Ok(count)
    }

    async fn get_details(&self, worker_ids: &[String]) -> CoreResult<Vec<WorkerInfo>> {
        let mut conn = self.conn.clone();
        let mut out = Vec::with_capacity(worker_ids.len());
        for worker_id in worker_ids {
            let fields: std::collections::HashMap<String, String> =
                conn.hgetall(detail_key(worker_id)).await.map_err(map_redis_err)?;
            if fields.is_empty() {
                continue;
            }
            let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
            let started_at_ms: i64 = get("started_at").parse().unwrap_or(0);
            out.push(WorkerInfo {
                worker_id: worker_id.clone(),
                queue_name: get("queue_name"),
                started_at: Utc.timestamp_millis_opt(started_at_ms).single().unwrap_or_else(Utc::now),
                active_jobs: get("active_jobs").parse().unwrap_or(0),
                processed_jobs: get("processed_jobs").parse().unwrap_or(0),
                failed_jobs: get("failed_jobs").parse().unwrap_or(0),
            });
        }
        Ok(out)
    }

    async fn prune_offline(&self) -> CoreResult<u64> {
        let mut conn = self.conn.clone();
        let cutoff = Utc::now().timestamp_millis() - ONLINE_THRESHOLD_MS;
        let stale: Vec<String> = conn
            .zrangebyscore(HEARTBEAT_ZSET, "-inf", cutoff)
            .await
            .map_err(map_redis_err)?;
        if stale.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        pipe.zrembyscore(HEARTBEAT_ZSET, "-inf", cutoff).ignore();
        for worker_id in &stale {
            pipe.del(detail_key(worker_id)).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(stale.len() as u64)
    }

    async fn remove(&self, worker_id: &str) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .zrem(HEARTBEAT_ZSET, worker_id)
            .ignore()
            .del(detail_key(worker_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }
}
