//! The `Job` entity (spec.md §3) and the options that shape its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of lifecycle states a `Job` can occupy.
///
/// `COMPLETED`, `FAILED` and `CANCELLED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Active,
    Delayed,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Closed set of error codes a job handler may return (spec.md §4.3).
///
/// The Worker Pool — not the handler — decides retriable vs. terminal; see
/// [`ErrorCode::is_retriable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LoginRequired,
    PermissionDenied,
    EditorLoadFail,
    ImageUploadFail,
    NetworkError,
    CafeNotFound,
    RateLimited,
    ChallengeRequired,
    AuthExpired,
    Timeout,
    Unknown,
}

impl ErrorCode {
    /// {NETWORK_ERROR, IMAGE_UPLOAD_FAIL, RATE_LIMITED, TIMEOUT} retry;
    /// everything else is a terminal failure (spec.md §4.3).
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkError
                | ErrorCode::ImageUploadFail
                | ErrorCode::RateLimited
                | ErrorCode::Timeout
        )
    }

    /// Session-fatal codes force the Worker Pool to stop dispatch for the
    /// owning user until re-authentication (spec.md §7).
    pub fn is_session_fatal(self) -> bool {
        matches!(self, ErrorCode::AuthExpired | ErrorCode::ChallengeRequired)
    }
}

/// One unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub job_type: String,
    pub payload: Value,
    pub user_id: Option<String>,
    pub schedule_run_id: Option<String>,
    pub sequence_number: Option<u32>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub status: JobStatus,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub return_value: Option<Value>,
    /// Worker id currently holding this job while `status == Active`.
    pub owner_worker_id: Option<String>,
    /// Set by `JobQueue::cancel` on an ACTIVE job; the owning worker is
    /// expected to observe this cooperatively and abort (spec.md §4.1).
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            user_id: None,
            schedule_run_id: None,
            sequence_number: None,
            attempts_made: 0,
            max_attempts: 3,
            priority: 0,
            status: JobStatus::Queued,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            return_value: None,
            owner_worker_id: None,
            cancel_requested: false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }
}

/// Recurring-job registration (spec.md §4.1 "repeat").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatOptions {
    pub every_ms: i64,
    pub job_id: String,
}

/// Options accepted by `JobQueue::enqueue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Defer visibility by this many milliseconds.
    pub delay_ms: Option<i64>,
    /// Lower runs earlier.
    pub priority: Option<i32>,
    /// Retry budget; defaults to 3 at the `JobQueue` implementation.
    pub attempts: Option<u32>,
    /// Retain at most K completed jobs (0 = remove immediately).
    pub remove_on_complete: Option<u32>,
    /// Retain at most K failed jobs.
    pub remove_on_fail: Option<u32>,
    pub repeat: Option<RepeatOptions>,
    pub user_id: Option<String>,
    pub schedule_run_id: Option<String>,
    pub sequence_number: Option<u32>,
}

/// Counts returned by `JobQueue::get_counts` (spec.md §3 `getCounts`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
        assert!(!JobStatus::Delayed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn retriable_error_codes() {
        assert!(ErrorCode::NetworkError.is_retriable());
        assert!(ErrorCode::ImageUploadFail.is_retriable());
        assert!(ErrorCode::RateLimited.is_retriable());
        assert!(ErrorCode::Timeout.is_retriable());
        assert!(!ErrorCode::PermissionDenied.is_retriable());
        assert!(!ErrorCode::CafeNotFound.is_retriable());
        assert!(!ErrorCode::Unknown.is_retriable());
    }

    #[test]
    fn session_fatal_codes() {
        assert!(ErrorCode::AuthExpired.is_session_fatal());
        assert!(ErrorCode::ChallengeRequired.is_session_fatal());
        assert!(!ErrorCode::Timeout.is_session_fatal());
    }

    #[test]
    fn can_retry_respects_budget() {
        let mut job = Job::new("cafe-jobs", "CREATE_POST", serde_json::json!({}));
        job.max_attempts = 2;
        assert!(job.can_retry());
        job.attempts_made = 2;
        assert!(!job.can_retry());
    }
}
