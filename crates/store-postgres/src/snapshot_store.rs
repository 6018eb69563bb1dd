use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_core::{CoreResult, QueueStatsSnapshot, SnapshotStore};
use sqlx::{PgPool, Row};

use crate::error::map_sqlx_err;

#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_snapshot(row: sqlx::postgres::PgRow) -> QueueStatsSnapshot {
    QueueStatsSnapshot {
        queue_name: row.get("queue_name"),
        waiting: row.get::<i64, _>("waiting") as u64,
        active: row.get::<i64, _>("active") as u64,
        delayed: row.get::<i64, _>("delayed") as u64,
        completed: row.get::<i64, _>("completed") as u64,
        failed: row.get::<i64, _>("failed") as u64,
        paused: row.get("paused"),
        jobs_per_min: row.get::<Option<i64>, _>("jobs_per_min").map(|n| n as u64),
        clamped: row.get("clamped"),
        online_workers: row.get::<i64, _>("online_workers") as u64,
        timestamp: row.get("timestamp"),
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn insert(&self, snapshot: QueueStatsSnapshot) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_stats_snapshots
                (queue_name, waiting, active, delayed, completed, failed, paused, jobs_per_min, clamped, online_workers, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&snapshot.queue_name)
        .bind(snapshot.waiting as i64)
        .bind(snapshot.active as i64)
        .bind(snapshot.delayed as i64)
        .bind(snapshot.completed as i64)
        .bind(snapshot.failed as i64)
        .bind(snapshot.paused)
        .bind(snapshot.jobs_per_min.map(|n| n as i64))
        .bind(snapshot.clamped)
        .bind(snapshot.online_workers as i64)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn most_recent(&self, queue_name: &str) -> CoreResult<Option<QueueStatsSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM queue_stats_snapshots
            WHERE queue_name = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row.map(row_to_snapshot))
    }

    async fn recent(&self, queue_name: &str, n: u64) -> CoreResult<Vec<QueueStatsSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM queue_stats_snapshots
                WHERE queue_name = $1
                ORDER BY timestamp DESC
                LIMIT $2
            ) recent_desc
            ORDER BY timestamp ASC
            "#,
        )
        .bind(queue_name)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(row_to_snapshot).collect())
    }

    async fn since(
        &self,
        queue_name: &str,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<QueueStatsSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM queue_stats_snapshots
            WHERE queue_name = $1 AND timestamp >= $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(queue_name)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(row_to_snapshot).collect())
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM queue_stats_snapshots WHERE timestamp < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}
