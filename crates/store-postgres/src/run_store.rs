use async_trait::async_trait;
use chrono::NaiveDate;
use dispatch_core::{CoreResult, RunStatus, RunStore, ScheduleRun};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::enums::{run_status_to_str, str_to_run_status};
use crate::error::map_sqlx_err;

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: sqlx::postgres::PgRow) -> ScheduleRun {
    ScheduleRun {
        id: row.get::<Uuid, _>("id").to_string(),
        schedule_id: row.get("schedule_id"),
        user_id: row.get("user_id"),
        run_date: row.get("run_date"),
        status: str_to_run_status(row.get("status")),
        total_jobs: row.get::<i32, _>("total_jobs") as u32,
        completed_jobs: row.get::<i32, _>("completed_jobs") as u32,
        failed_jobs: row.get::<i32, _>("failed_jobs") as u32,
        triggered_at: row.get("triggered_at"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_or_get_open(
        &self,
        schedule_id: &str,
        user_id: &str,
        run_date: NaiveDate,
        total_jobs: u32,
    ) -> CoreResult<(ScheduleRun, bool)> {
        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            r#"
            INSERT INTO schedule_runs (id, schedule_id, user_id, run_date, status, total_jobs, triggered_at)
            VALUES ($1, $2, $3, $4, 'PENDING', $5, NOW())
            ON CONFLICT (schedule_id, run_date) WHERE status IN ('PENDING', 'RUNNING') DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(schedule_id)
        .bind(user_id)
        .bind(run_date)
        .bind(total_jobs as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(row) = inserted {
            return Ok((row_to_run(row), true));
        }

        let existing = sqlx::query(
            r#"
            SELECT * FROM schedule_runs
            WHERE schedule_id = $1 AND run_date = $2 AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(schedule_id)
        .bind(run_date)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok((row_to_run(existing), false))
    }

    async fn get(&self, run_id: &str) -> CoreResult<Option<ScheduleRun>> {
        let id: Uuid = run_id.parse().map_err(|_| {
            dispatch_core::CoreError::Validation(format!("invalid run id: {run_id}"))
        })?;
        let row = sqlx::query("SELECT * FROM schedule_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.map(row_to_run))
    }

    async fn bump_completed(&self, run_id: &str) -> CoreResult<ScheduleRun> {
        let id: Uuid = run_id.parse().map_err(|_| {
            dispatch_core::CoreError::Validation(format!("invalid run id: {run_id}"))
        })?;
        let row = sqlx::query(
            r#"
            UPDATE schedule_runs
            SET completed_jobs = completed_jobs + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row_to_run(row))
    }

    async fn bump_failed(&self, run_id: &str) -> CoreResult<ScheduleRun> {
        let id: Uuid = run_id.parse().map_err(|_| {
            dispatch_core::CoreError::Validation(format!("invalid run id: {run_id}"))
        })?;
        let row = sqlx::query(
            r#"
            UPDATE schedule_runs
            SET failed_jobs = failed_jobs + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(row_to_run(row))
    }

    async fn mark_started(&self, run_id: &str) -> CoreResult<()> {
        let id: Uuid = run_id.parse().map_err(|_| {
            dispatch_core::CoreError::Validation(format!("invalid run id: {run_id}"))
        })?;
        sqlx::query(
            r#"
            UPDATE schedule_runs
            SET status = 'RUNNING', started_at = COALESCE(started_at, NOW())
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn mark_finished(&self, run_id: &str, status: RunStatus) -> CoreResult<()> {
        let id: Uuid = run_id.parse().map_err(|_| {
            dispatch_core::CoreError::Validation(format!("invalid run id: {run_id}"))
        })?;
        sqlx::query(
            r#"
            UPDATE schedule_runs
            SET status = $2, finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run_status_to_str(status))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn list_active(&self, grace_secs: i64) -> CoreResult<Vec<ScheduleRun>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM schedule_runs
            WHERE status IN ('PENDING', 'RUNNING')
               OR (finished_at IS NOT NULL AND finished_at >= NOW() - make_interval(secs => $1))
            ORDER BY triggered_at ASC
            "#,
        )
        .bind(grace_secs as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(row_to_run).collect())
    }
}
