//! `ScheduleRun` — the materialized daily plan for one schedule (spec.md
//! §3/§4.4).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub id: String,
    pub schedule_id: String,
    pub user_id: String,
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub triggered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScheduleRun {
    pub fn processed_jobs(&self) -> u32 {
        self.completed_jobs + self.failed_jobs
    }

    pub fn is_fully_processed(&self) -> bool {
        self.processed_jobs() >= self.total_jobs
    }

    /// Terminal storage status once every child job has terminated:
    /// COMPLETED (possibly with `failed_jobs > 0`, i.e. "partial" at the
    /// storage layer — spec.md §4.4) unless every job failed, in which
    /// case FAILED.
    pub fn terminal_status(&self) -> RunStatus {
        if self.completed_jobs == 0 && self.failed_jobs > 0 && self.failed_jobs == self.total_jobs
        {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }
}

/// Per-job event surfaced to dashboard consumers (spec.md §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobEvent {
    pub index: u32,
    pub result: RunJobResult,
    pub error_code: Option<crate::job::ErrorCode>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunJobResult {
    Ok,
    Err,
}

/// Derived status computed from counters, never from a single stored
/// field (spec.md §4.10 / §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerivedRunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Partial,
}

pub fn derive_run_status(run: &ScheduleRun, any_job_started: bool) -> DerivedRunStatus {
    let processed = run.processed_jobs();
    if processed < run.total_jobs {
        return if any_job_started {
            DerivedRunStatus::Running
        } else {
            DerivedRunStatus::Queued
        };
    }
    if run.failed_jobs == 0 {
        DerivedRunStatus::Completed
    } else if run.completed_jobs == 0 {
        DerivedRunStatus::Failed
    } else {
        DerivedRunStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_run() -> ScheduleRun {
        ScheduleRun {
            id: "run-1".into(),
            schedule_id: "sched-1".into(),
            user_id: "user-1".into(),
            run_date: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            status: RunStatus::Running,
            total_jobs: 3,
            completed_jobs: 0,
            failed_jobs: 0,
            triggered_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn s1_ordinary_run_is_completed() {
        let mut run = base_run();
        run.completed_jobs = 3;
        assert_eq!(derive_run_status(&run, true), DerivedRunStatus::Completed);
        assert_eq!(run.terminal_status(), RunStatus::Completed);
    }

    #[test]
    fn s2_partial_failure_is_partial() {
        let mut run = base_run();
        run.completed_jobs = 2;
        run.failed_jobs = 1;
        assert_eq!(derive_run_status(&run, true), DerivedRunStatus::Partial);
    }

    #[test]
    fn all_failed_is_failed() {
        let mut run = base_run();
        run.failed_jobs = 3;
        assert_eq!(derive_run_status(&run, true), DerivedRunStatus::Failed);
        assert_eq!(run.terminal_status(), RunStatus::Failed);
    }

    #[test]
    fn unprocessed_run_is_queued_or_running() {
        let run = base_run();
        assert_eq!(derive_run_status(&run, false), DerivedRunStatus::Queued);
        assert_eq!(derive_run_status(&run, true), DerivedRunStatus::Running);
    }
}
