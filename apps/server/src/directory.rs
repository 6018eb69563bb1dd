//! Minimal adapters onto the out-of-scope schedule/template and
//! session/auth subsystems (spec.md §1 "explicitly out of scope";
//! DESIGN.md Open Question 5). The real versions of these live in the
//! product's user-facing service, not in this core; `dispatch-server`
//! only needs *something* concrete to hand the Schedule Planner and
//! Worker Pool at construction time, so this reads the handful of columns
//! the Policy Gate and Run materialization actually consume out of a
//! small `schedules` table owned by this binary, not by `dispatch-core`.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use dispatch_core::{
    AdminStatus, CoreError, CoreResult, ScheduleConfig, ScheduleDirectory, SessionStatus,
    SessionStatusSink,
};

pub struct PgScheduleDirectory {
    pool: PgPool,
}

impl PgScheduleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    schedule_id: String,
    user_id: String,
    run_time: chrono::NaiveTime,
    daily_post_count: i32,
    post_interval_minutes: i32,
    max_posts_per_day: i32,
    schedule_name: String,
    template_id: String,
    template_name: String,
    cafe_name: String,
    board_name: String,
    session_status: String,
    admin_status: String,
    user_enabled: bool,
    consecutive_failures: i32,
}

fn parse_session_status(s: &str) -> SessionStatus {
    match s {
        "HEALTHY" => SessionStatus::Healthy,
        "EXPIRING" => SessionStatus::Expiring,
        "EXPIRED" => SessionStatus::Expired,
        "CHALLENGE_REQUIRED" => SessionStatus::ChallengeRequired,
        _ => SessionStatus::Error,
    }
}

fn session_status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Healthy => "HEALTHY",
        SessionStatus::Expiring => "EXPIRING",
        SessionStatus::Expired => "EXPIRED",
        SessionStatus::ChallengeRequired => "CHALLENGE_REQUIRED",
        SessionStatus::Error => "ERROR",
    }
}

fn parse_admin_status(s: &str) -> AdminStatus {
    match s {
        "APPROVED" => AdminStatus::Approved,
        "SUSPENDED" => AdminStatus::Suspended,
        "BANNED" => AdminStatus::Banned,
        _ => AdminStatus::NeedsReview,
    }
}

#[async_trait]
impl ScheduleDirectory for PgScheduleDirectory {
    async fn due_schedules(&self, _date: NaiveDate) -> CoreResult<Vec<ScheduleConfig>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            r#"
            SELECT schedule_id, user_id, run_time, daily_post_count, post_interval_minutes,
                   max_posts_per_day, schedule_name, template_id, template_name, cafe_name,
                   board_name, session_status, admin_status, user_enabled, consecutive_failures
            FROM schedules
            WHERE user_enabled
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;

        Ok(rows
            .into_iter()
            .map(|r| ScheduleConfig {
                schedule_id: r.schedule_id,
                user_id: r.user_id,
                run_time: r.run_time,
                daily_post_count: r.daily_post_count.max(0) as u32,
                post_interval_minutes: r.post_interval_minutes.max(0) as u32,
                max_posts_per_day: r.max_posts_per_day.max(0) as u32,
                schedule_name: r.schedule_name,
                template_id: r.template_id,
                template_name: r.template_name,
                cafe_name: r.cafe_name,
                board_name: r.board_name,
                session_status: parse_session_status(&r.session_status),
                admin_status: parse_admin_status(&r.admin_status),
                user_enabled: r.user_enabled,
                consecutive_failures: r.consecutive_failures.max(0) as u32,
            })
            .collect())
    }

    async fn executed_posts_today(&self, user_id: &str, date: NaiveDate) -> CoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM executed_posts
            WHERE user_id = $1 AND executed_on = $2
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(count.max(0) as u32)
    }

    async fn record_success(&self, schedule_id: &str) -> CoreResult<()> {
        sqlx::query("UPDATE schedules SET consecutive_failures = 0 WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    async fn record_failure(&self, schedule_id: &str) -> CoreResult<u32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE schedules SET consecutive_failures = consecutive_failures + 1
            WHERE schedule_id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(count.max(0) as u32)
    }

    async fn set_admin_status(&self, schedule_id: &str, status: AdminStatus) -> CoreResult<()> {
        let value = match status {
            AdminStatus::Approved => "APPROVED",
            AdminStatus::NeedsReview => "NEEDS_REVIEW",
            AdminStatus::Suspended => "SUSPENDED",
            AdminStatus::Banned => "BANNED",
        };
        sqlx::query("UPDATE schedules SET admin_status = $1 WHERE schedule_id = $2")
            .bind(value)
            .bind(schedule_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }
}

/// Bridges the Worker Pool's session-fatal-error transitions (spec.md §7)
/// onto the same `schedules` table's `session_status` column.
pub struct PgSessionStatusSink {
    pool: PgPool,
}

impl PgSessionStatusSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStatusSink for PgSessionStatusSink {
    async fn set_session_status(&self, user_id: &str, status: SessionStatus) -> CoreResult<()> {
        sqlx::query("UPDATE schedules SET session_status = $1 WHERE user_id = $2")
            .bind(session_status_str(status))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }
}
