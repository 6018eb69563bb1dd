//! Narrow seams onto explicitly out-of-scope subsystems (spec.md §1,
//! SPEC_FULL.md "Supplemental Behavior"): user authentication/session
//! management and schedule/template configuration. The core depends on
//! these traits, never on a concrete implementation.

use async_trait::async_trait;
use chrono::NaiveTime;

use crate::error::CoreResult;
use crate::job::Job;
use crate::policy::{AdminStatus, SessionStatus};

/// One due Schedule, as read from the (out-of-scope) schedule/template
/// configuration store.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub schedule_id: String,
    pub user_id: String,
    pub run_time: NaiveTime,
    pub daily_post_count: u32,
    pub post_interval_minutes: u32,
    pub max_posts_per_day: u32,
    pub schedule_name: String,
    pub template_id: String,
    pub template_name: String,
    pub cafe_name: String,
    pub board_name: String,
    pub session_status: SessionStatus,
    pub admin_status: AdminStatus,
    pub user_enabled: bool,
    pub consecutive_failures: u32,
}

/// Seam onto the out-of-scope Schedule/template/user subsystem: lookup of
/// due schedules, and the two counters the Policy Gate mutates
/// (consecutive-failure count and admin status).
#[async_trait]
pub trait ScheduleDirectory: Send + Sync {
    async fn due_schedules(&self, date: chrono::NaiveDate) -> CoreResult<Vec<ScheduleConfig>>;

    async fn executed_posts_today(&self, user_id: &str, date: chrono::NaiveDate) -> CoreResult<u32>;

    async fn record_success(&self, schedule_id: &str) -> CoreResult<()>;

    /// Returns the consecutive-failure count after incrementing.
    async fn record_failure(&self, schedule_id: &str) -> CoreResult<u32>;

    async fn set_admin_status(&self, schedule_id: &str, status: AdminStatus) -> CoreResult<()>;
}

/// Seam onto the out-of-scope session/authentication subsystem: the
/// Worker Pool calls this when a handler returns a session-fatal error
/// code (spec.md §4.3/§7).
#[async_trait]
pub trait SessionStatusSink: Send + Sync {
    async fn set_session_status(&self, user_id: &str, status: SessionStatus) -> CoreResult<()>;
}

/// Seam the Worker Pool calls on every terminal job outcome carrying a
/// `scheduleRunId` (spec.md §4.4 "Run progress"), so `dispatch-worker`
/// never has to depend on `RunStore` or `dispatch-scheduler` directly.
#[async_trait]
pub trait RunProgressSink: Send + Sync {
    async fn record_job_terminal(&self, job: &Job, succeeded: bool) -> CoreResult<()>;
}
