//! Schedule Planner + Policy Gate wiring (spec.md §4.4/§4.5).
//!
//! Gathers the inputs `dispatch_core::policy::evaluate_policy` needs from
//! the (out-of-scope) `ScheduleDirectory` seam and the `JobQueue`, then
//! either materializes a `ScheduleRun` and its `CREATE_POST` jobs or
//! records a skipped-Run audit entry — mirrors the split the teacher uses
//! between a pure decision (`dispatch_core::policy`) and the IO-owning
//! orchestrator around it.

use std::sync::Arc;

use chrono::{NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{info, warn};

use dispatch_core::{
    async_trait, evaluate_policy, should_auto_suspend, ActorType, AdminStatus, AuditLogEntry,
    AuditStore, CoreResult, EnqueueOptions, Job, JobQueue, JobStatus, PolicyBlock, PolicyInput,
    RunProgressSink, RunStatus, RunStore, ScheduleConfig, ScheduleDirectory,
    DEFAULT_AUTO_SUSPEND_THRESHOLD,
};

pub struct SchedulePlanner {
    queue: Arc<dyn JobQueue>,
    directory: Arc<dyn ScheduleDirectory>,
    run_store: Arc<dyn RunStore>,
    audit: Arc<dyn AuditStore>,
    queue_name: String,
    tz: Tz,
    auto_suspend_threshold: u32,
}

impl SchedulePlanner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        directory: Arc<dyn ScheduleDirectory>,
        run_store: Arc<dyn RunStore>,
        audit: Arc<dyn AuditStore>,
        queue_name: impl Into<String>,
        tz: Tz,
    ) -> Self {
        Self {
            queue,
            directory,
            run_store,
            audit,
            queue_name: queue_name.into(),
            tz,
            auto_suspend_threshold: DEFAULT_AUTO_SUSPEND_THRESHOLD,
        }
    }

    pub fn with_auto_suspend_threshold(mut self, threshold: u32) -> Self {
        self.auto_suspend_threshold = threshold;
        self
    }

    /// Runs once per minute in `apps/server`. Fans out over every Schedule
    /// due today whose `runTime` matches the current minute in `self.tz`.
    pub async fn tick(&self, now: chrono::DateTime<Utc>) -> CoreResult<()> {
        let now_local = now.with_timezone(&self.tz);
        let today = now_local.date_naive();
        let minute = now_local.time().with_second(0).unwrap_or(now_local.time());

        let due = self.directory.due_schedules(today).await?;
        for schedule in due.into_iter().filter(|s| s.run_time.with_second(0).unwrap_or(s.run_time) == minute) {
            if let Err(e) = self.plan_one(&schedule, today).await {
                warn!(schedule_id = %schedule.schedule_id, error = %e, "schedule planning failed");
            }
        }
        Ok(())
    }

    /// Runs a single Schedule's Policy Gate check + Run materialization,
    /// regardless of `runTime` — used for both the per-minute `tick` and
    /// operator-triggered run-now (spec.md §4.4 "Run-now").
    pub async fn plan_one(&self, schedule: &ScheduleConfig, run_date: NaiveDate) -> CoreResult<Option<String>> {
        let executed_posts_today =
            self.directory.executed_posts_today(&schedule.user_id, run_date).await?;
        let duplicate_create_post_exists =
            self.duplicate_exists(&schedule.user_id, &schedule.template_id, run_date).await?;

        let input = PolicyInput {
            session_status: schedule.session_status,
            admin_status: schedule.admin_status,
            user_enabled: schedule.user_enabled,
            executed_posts_today,
            max_posts_per_day: schedule.max_posts_per_day,
            duplicate_create_post_exists,
        };

        if let Err(block) = evaluate_policy(&input) {
            self.record_skip(schedule, block).await;
            return Ok(None);
        }

        let (run, created) = self
            .run_store
            .create_or_get_open(&schedule.schedule_id, &schedule.user_id, run_date, schedule.daily_post_count)
            .await?;
        if !created {
            info!(schedule_id = %schedule.schedule_id, run_date = %run_date, "run already planned for today, skipping");
            return Ok(Some(run.id));
        }

        let gap_ms = i64::from(schedule.post_interval_minutes) * 60_000;
        for i in 1..=schedule.daily_post_count {
            let delay_ms = i64::from(i - 1) * gap_ms;
            let payload = json!({
                "totalExecutions": schedule.daily_post_count,
                "sequenceNumber": i,
                "templateId": schedule.template_id,
                "scheduleName": schedule.schedule_name,
                "templateName": schedule.template_name,
                "cafeName": schedule.cafe_name,
                "boardName": schedule.board_name,
            });
            let opts = EnqueueOptions {
                delay_ms: Some(delay_ms),
                user_id: Some(schedule.user_id.clone()),
                schedule_run_id: Some(run.id.clone()),
                sequence_number: Some(i),
                ..Default::default()
            };
            self.queue.enqueue(&self.queue_name, "CREATE_POST", payload, opts).await?;
        }

        info!(
            schedule_id = %schedule.schedule_id,
            run_id = %run.id,
            total_jobs = schedule.daily_post_count,
            "scheduled run materialized"
        );
        Ok(Some(run.id))
    }

    /// Duplicate suppression (spec.md §4.5): no other non-terminal
    /// CREATE_POST for the same `(userId, templateId)` today. The Queue has
    /// no secondary index on payload fields, so this scans WAITING/DELAYED/
    /// ACTIVE CREATE_POST jobs directly — acceptable at this scale; a
    /// dedicated index would be the first thing to add if this queue grows
    /// past a few thousand live jobs.
    async fn duplicate_exists(&self, user_id: &str, template_id: &str, today: NaiveDate) -> CoreResult<bool> {
        for status in [JobStatus::Queued, JobStatus::Delayed, JobStatus::Active] {
            let jobs = self.queue.list_jobs(&self.queue_name, Some(status), 0, 1000).await?;
            for job in jobs {
                if job.job_type != "CREATE_POST" {
                    continue;
                }
                if job.user_id.as_deref() != Some(user_id) {
                    continue;
                }
                if job.created_at.with_timezone(&self.tz).date_naive() != today {
                    continue;
                }
                if job.payload.get("templateId").and_then(|v| v.as_str()) == Some(template_id) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn record_skip(&self, schedule: &ScheduleConfig, block: PolicyBlock) {
        let entry = AuditLogEntry::new(ActorType::System, "schedule", &schedule.schedule_id, "RUN_SKIPPED")
            .with_reason(block.code());
        if let Err(e) = self.audit.append(entry).await {
            warn!(schedule_id = %schedule.schedule_id, error = %e, "failed to record skipped-run audit entry");
        }
    }

    /// Called by the caller's failure-reporting path (see
    /// `RunProgressTracker::record_job_terminal`) whenever a Schedule's
    /// `CREATE_POST` job terminates, to drive auto-suspend (spec.md §4.5
    /// "a successful job resets the counter").
    pub async fn observe_job_outcome(&self, schedule_id: &str, succeeded: bool) -> CoreResult<()> {
        if succeeded {
            self.directory.record_success(schedule_id).await?;
            return Ok(());
        }
        let consecutive_failures = self.directory.record_failure(schedule_id).await?;
        if should_auto_suspend(consecutive_failures, self.auto_suspend_threshold) {
            self.directory.set_admin_status(schedule_id, AdminStatus::Suspended).await?;
            let entry = AuditLogEntry::new(ActorType::System, "schedule", schedule_id, "AUTO_SUSPEND")
                .with_reason(format!("{consecutive_failures} consecutive failures"));
            if let Err(e) = self.audit.append(entry).await {
                warn!(schedule_id = %schedule_id, error = %e, "failed to record auto-suspend audit entry");
            }
        }
        Ok(())
    }
}

/// Bridges terminal `CREATE_POST` jobs to both Run-counter bookkeeping
/// (`RunStore`) and the Policy Gate's auto-suspend counter, implementing
/// the `RunProgressSink` seam `dispatch-worker` calls on every terminal
/// job that carries a `scheduleRunId`.
pub struct RunProgressTracker {
    run_store: Arc<dyn RunStore>,
    planner: Arc<SchedulePlanner>,
}

impl RunProgressTracker {
    pub fn new(run_store: Arc<dyn RunStore>, planner: Arc<SchedulePlanner>) -> Self {
        Self { run_store, planner }
    }
}

#[async_trait]
impl RunProgressSink for RunProgressTracker {
    async fn record_job_terminal(&self, job: &Job, succeeded: bool) -> CoreResult<()> {
        let run_id = match &job.schedule_run_id {
            Some(id) => id,
            None => return Ok(()),
        };

        self.run_store.mark_started(run_id).await?;
        let run = if succeeded {
            self.run_store.bump_completed(run_id).await?
        } else {
            self.run_store.bump_failed(run_id).await?
        };

        if run.is_fully_processed() {
            self.run_store.mark_finished(run_id, run.terminal_status()).await?;
        }

        self.planner.observe_job_outcome(&run.schedule_id, succeeded).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use dispatch_core::{AdminStatus as AS, CoreError, SessionStatus};
    use dispatch_testing::{InMemoryAuditStore, InMemoryJobQueue, InMemoryRunStore};
    use std::sync::Mutex;

    struct FakeDirectory {
        schedules: Mutex<Vec<ScheduleConfig>>,
        executed: Mutex<std::collections::HashMap<String, u32>>,
        failures: Mutex<std::collections::HashMap<String, u32>>,
        admin_status: Mutex<std::collections::HashMap<String, AS>>,
    }

    impl FakeDirectory {
        fn new(schedules: Vec<ScheduleConfig>) -> Self {
            Self {
                schedules: Mutex::new(schedules),
                executed: Mutex::new(Default::default()),
                failures: Mutex::new(Default::default()),
                admin_status: Mutex::new(Default::default()),
            }
        }
    }

    #[async_trait]
    impl ScheduleDirectory for FakeDirectory {
        async fn due_schedules(&self, _date: NaiveDate) -> CoreResult<Vec<ScheduleConfig>> {
            Ok(self.schedules.lock().unwrap().clone())
        }

        async fn executed_posts_today(&self, user_id: &str, _date: NaiveDate) -> CoreResult<u32> {
            Ok(*self.executed.lock().unwrap().get(user_id).unwrap_or(&0))
        }

        async fn record_success(&self, schedule_id: &str) -> CoreResult<()> {
            self.failures.lock().unwrap().insert(schedule_id.to_string(), 0);
            Ok(())
        }

        async fn record_failure(&self, schedule_id: &str) -> CoreResult<u32> {
            let mut failures = self.failures.lock().unwrap();
            let count = failures.entry(schedule_id.to_string()).or_insert(0);
            *count += 1;
            Ok(*count)
        }

        async fn set_admin_status(&self, schedule_id: &str, status: AS) -> CoreResult<()> {
            self.admin_status.lock().unwrap().insert(schedule_id.to_string(), status);
            Ok(())
        }
    }

    fn schedule(id: &str, user_id: &str) -> ScheduleConfig {
        ScheduleConfig {
            schedule_id: id.to_string(),
            user_id: user_id.to_string(),
            run_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            daily_post_count: 3,
            post_interval_minutes: 30,
            max_posts_per_day: 10,
            schedule_name: "Morning posts".into(),
            template_id: "tmpl-1".into(),
            template_name: "Daily special".into(),
            cafe_name: "Sunny Cafe".into(),
            board_name: "main".into(),
            session_status: SessionStatus::Healthy,
            admin_status: AS::Approved,
            user_enabled: true,
            consecutive_failures: 0,
        }
    }

    fn fixture() -> (SchedulePlanner, Arc<InMemoryJobQueue>, Arc<InMemoryRunStore>, Arc<InMemoryAuditStore>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let run_store = Arc::new(InMemoryRunStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let directory = Arc::new(FakeDirectory::new(vec![schedule("sched-1", "user-1")]));
        let planner = SchedulePlanner::new(
            queue.clone(),
            directory,
            run_store.clone(),
            audit.clone(),
            "cafe-jobs",
            chrono_tz::UTC,
        );
        (planner, queue, run_store, audit)
    }

    #[tokio::test]
    async fn plan_one_materializes_n_jobs_with_gapped_delays() {
        let (planner, queue, run_store, _audit) = fixture();
        let schedule = schedule("sched-1", "user-1");
        let run_id = planner.plan_one(&schedule, Utc::now().date_naive()).await.unwrap().unwrap();

        let run = run_store.get(&run_id).await.unwrap().unwrap();
        assert_eq!(run.total_jobs, 3);

        let jobs = queue.list_jobs("cafe-jobs", None, 0, 10).await.unwrap();
        assert_eq!(jobs.len(), 3);
        let mut seqs: Vec<u32> = jobs.iter().map(|j| j.sequence_number.unwrap()).collect();
        seqs.sort();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn second_call_same_day_does_not_duplicate_the_run() {
        let (planner, queue, _run_store, _audit) = fixture();
        let schedule = schedule("sched-1", "user-1");
        let today = Utc::now().date_naive();
        planner.plan_one(&schedule, today).await.unwrap();
        planner.plan_one(&schedule, today).await.unwrap();

        let jobs = queue.list_jobs("cafe-jobs", None, 0, 10).await.unwrap();
        assert_eq!(jobs.len(), 3, "no duplicate run means no duplicate jobs");
    }

    #[tokio::test]
    async fn blocked_policy_writes_skip_audit_and_no_jobs() {
        let (planner, queue, _run_store, audit) = fixture();
        let mut schedule = schedule("sched-1", "user-1");
        schedule.user_enabled = false;
        planner.plan_one(&schedule, Utc::now().date_naive()).await.unwrap();

        let jobs = queue.list_jobs("cafe-jobs", None, 0, 10).await.unwrap();
        assert!(jobs.is_empty());
        assert_eq!(audit.count_action("sched-1", "RUN_SKIPPED"), 1);
    }

    #[tokio::test]
    async fn auto_suspend_fires_after_threshold_consecutive_failures() {
        let (planner, _queue, _run_store, audit) = fixture();
        let planner = planner.with_auto_suspend_threshold(2);
        planner.observe_job_outcome("sched-1", false).await.unwrap();
        assert_eq!(audit.count_action("sched-1", "AUTO_SUSPEND"), 0);
        planner.observe_job_outcome("sched-1", false).await.unwrap();
        assert_eq!(audit.count_action("sched-1", "AUTO_SUSPEND"), 1);
    }

    #[test]
    fn not_found_error_code_is_stable() {
        assert_eq!(CoreError::NotFound("x".into()).code(), "NOT_FOUND");
    }
}
