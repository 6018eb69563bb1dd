//! `JobQueue` — the durable multi-state job store contract (spec.md §4.1).
//!
//! Generalizes the teacher's `seesaw::job::JobStore` trait (`claim_ready` /
//! `mark_succeeded` / `mark_failed` / `heartbeat`) into the richer surface
//! this spec requires: priorities, delays, pause/resume, drain, clean,
//! retry-failed and inspection.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreResult;
use crate::job::{EnqueueOptions, Job, JobCounts, JobStatus};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new job of `job_type` with `payload`, returning its id.
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        opts: EnqueueOptions,
    ) -> CoreResult<String>;

    /// Atomically move the oldest visible waiting job to ACTIVE, bound to
    /// `worker_id`. Blocks for at most a bounded interval (≤5s, spec.md
    /// §5); returns `None` on timeout or while the queue is paused.
    async fn reserve(&self, queue: &str, worker_id: &str) -> CoreResult<Option<Job>>;

    /// Mark a job COMPLETED.
    async fn ack(&self, queue: &str, job_id: &str, return_value: Option<Value>) -> CoreResult<()>;

    /// Mark a job failed. Schedules a jittered exponential-backoff retry
    /// if `attempts_made < max_attempts`, else moves it to FAILED.
    async fn fail(
        &self,
        queue: &str,
        job_id: &str,
        error_code: crate::job::ErrorCode,
        error_message: &str,
    ) -> CoreResult<()>;

    /// Cancel a WAITING/DELAYED job. Cancelling an ACTIVE job only flags
    /// it cooperatively; it never forces termination.
    async fn cancel(&self, queue: &str, job_id: &str) -> CoreResult<()>;

    /// Move an ACTIVE job back to WAITING without counting it as a failed
    /// attempt or applying backoff — used by the Worker Pool's graceful
    /// shutdown to hand still-owned jobs to a replacement worker (spec.md
    /// §4.3). A no-op if the job is not ACTIVE.
    async fn release(&self, queue: &str, job_id: &str) -> CoreResult<()>;

    async fn get_counts(&self, queue: &str) -> CoreResult<JobCounts>;

    /// Suspend reservation of new jobs. ACTIVE jobs are unaffected.
    async fn pause(&self, queue: &str) -> CoreResult<()>;
    async fn resume(&self, queue: &str) -> CoreResult<()>;

    /// Remove all WAITING and DELAYED jobs. Does not touch ACTIVE.
    /// Returns the number removed.
    async fn drain(&self, queue: &str) -> CoreResult<u64>;

    /// Remove up to `limit` jobs in `status` older than the retention
    /// threshold. Returns the number removed.
    async fn clean(&self, queue: &str, status: JobStatus, limit: u64) -> CoreResult<u64>;

    /// Move all FAILED jobs back to WAITING, resetting `attempts_made` by
    /// one and preserving `job_id`. Returns the number moved.
    async fn retry_failed(&self, queue: &str) -> CoreResult<u64>;

    /// Move one FAILED job back to WAITING, same reset-by-one semantics as
    /// [`JobQueue::retry_failed`] but scoped to a single `job_id` — backs
    /// the control plane's per-job retry endpoint (spec.md §6). Returns an
    /// error if the job is not currently FAILED.
    async fn retry_job(&self, queue: &str, job_id: &str) -> CoreResult<()>;

    async fn list_jobs(
        &self,
        queue: &str,
        status: Option<JobStatus>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Vec<Job>>;

    async fn get_job(&self, queue: &str, job_id: &str) -> CoreResult<Option<Job>>;

    /// Move every ACTIVE job whose lease has expired back to WAITING,
    /// without counting a retry attempt — the queue's half of "restart
    /// safety" (spec.md §5): a worker that died without releasing its
    /// jobs must not strand them forever. Returns the number reclaimed.
    async fn reap_expired_leases(&self, queue: &str) -> CoreResult<u64>;
}
