//! `InMemoryJobQueue` — a single-process stand-in for `RedisJobQueue`,
//! mirroring the teacher's dedicated `seesaw-testing` crate: a fake that
//! exists only so other crates' `#[cfg(test)]` modules don't need a live
//! Redis. Same state-transition semantics as `dispatch-queue-redis`'s Lua
//! scripts (drain deletes, fail applies jittered backoff, release/reap
//! never consume a retry attempt), just guarded by a `Mutex` instead of
//! `EVAL`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use dispatch_core::{
    retry_delay_ms, CoreError, CoreResult, EnqueueOptions, ErrorCode, Job, JobCounts, JobQueue,
    JobStatus,
};

/// Lease granted to a reserved job before `reap_expired_leases` may
/// reclaim it — mirrors `RESERVE_LEASE_MS` in `dispatch-queue-redis`.
const RESERVE_LEASE_MS: i64 = 10 * 60 * 1000;

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    waiting: Vec<String>,
    delayed: Vec<(String, i64)>,
    active: Vec<String>,
    completed: Vec<String>,
    failed: Vec<String>,
    paused: bool,
    leases: HashMap<String, i64>,
    /// repeat job id -> currently live (non-terminal) job id.
    repeat_live: HashMap<String, String>,
    /// job id -> repeat job id, so terminal transitions can free the slot.
    repeat_owner: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryJobQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(kind: &str, id: &str) -> CoreError {
        CoreError::NotFound(format!("{kind} {id} not found"))
    }

    fn release_repeat_slot(state: &mut QueueState, job_id: &str) {
        if let Some(repeat_id) = state.repeat_owner.remove(job_id) {
            state.repeat_live.remove(&repeat_id);
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        opts: EnqueueOptions,
    ) -> CoreResult<String> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.entry(queue.to_string()).or_default();

        if let Some(repeat) = &opts.repeat {
            if let Some(existing_id) = state.repeat_live.get(&repeat.job_id) {
                if state
                    .jobs
                    .get(existing_id)
                    .map(|j| !j.status.is_terminal())
                    .unwrap_or(false)
                {
                    return Ok(existing_id.clone());
                }
            }
        }

        let mut job = Job::new(queue, job_type, payload);
        job.user_id = opts.user_id;
        job.schedule_run_id = opts.schedule_run_id;
        job.sequence_number = opts.sequence_number;
        job.priority = opts.priority.unwrap_or(0);
        job.max_attempts = opts.attempts.unwrap_or(3);

        let job_id = job.id.clone();
        let now_ms = Utc::now().timestamp_millis();
        if let Some(delay) = opts.delay_ms {
            job.status = JobStatus::Delayed;
            state.delayed.push((job_id.clone(), now_ms + delay));
        } else {
            state.waiting.push(job_id.clone());
        }

        if let Some(repeat) = &opts.repeat {
            state.repeat_live.insert(repeat.job_id.clone(), job_id.clone());
            state.repeat_owner.insert(job_id.clone(), repeat.job_id.clone());
        }

        state.jobs.insert(job_id.clone(), job);
        Ok(job_id)
    }

    async fn reserve(&self, queue: &str, worker_id: &str) -> CoreResult<Option<Job>> {
        let now_ms = Utc::now().timestamp_millis();
        let mut queues = self.queues.lock().unwrap();
        let state = match queues.get_mut(queue) {
            Some(s) => s,
            None => return Ok(None),
        };
        if state.paused {
            return Ok(None);
        }

        let due: Vec<String> = {
            let mut still_delayed = Vec::new();
            let mut promoted = Vec::new();
            for (id, visible_at) in state.delayed.drain(..) {
                if visible_at <= now_ms {
                    promoted.push(id);
                } else {
                    still_delayed.push((id, visible_at));
                }
            }
            state.delayed = still_delayed;
            promoted
        };
        for id in due {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.status = JobStatus::Queued;
            }
            state.waiting.push(id);
        }

        let best = state
            .waiting
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| state.jobs.get(id).map(|j| (idx, j.priority, j.created_at)))
            .min_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
            .map(|(idx, _, _)| idx);

        let idx = match best {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let job_id = state.waiting.remove(idx);
        let job = state.jobs.get_mut(&job_id).expect("indexed job must exist");
        job.status = JobStatus::Active;
        job.started_at = Some(Utc::now());
        job.owner_worker_id = Some(worker_id.to_string());
        job.cancel_requested = false;
        // attemptsMade counts times reserved, not times failed (BullMQ
        // semantics) — bumping it here is what makes a successful final
        // attempt still show up in the count (spec.md §8 property 3 / S3).
        job.attempts_made += 1;
        state.active.push(job_id.clone());
        state.leases.insert(job_id.clone(), now_ms + RESERVE_LEASE_MS);
        Ok(Some(job.clone()))
    }

    async fn ack(&self, queue: &str, job_id: &str, return_value: Option<Value>) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.get_mut(queue).ok_or_else(|| Self::not_found("queue", queue))?;
        state.active.retain(|id| id != job_id);
        state.leases.remove(job_id);
        let job = state.jobs.get_mut(job_id).ok_or_else(|| Self::not_found("job", job_id))?;
        job.status = JobStatus::Completed;
        job.return_value = return_value;
        job.finished_at = Some(Utc::now());
        job.owner_worker_id = None;
        state.completed.push(job_id.to_string());
        Self::release_repeat_slot(state, job_id);
        Ok(())
    }

    async fn fail(
        &self,
        queue: &str,
        job_id: &str,
        error_code: ErrorCode,
        error_message: &str,
    ) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.get_mut(queue).ok_or_else(|| Self::not_found("queue", queue))?;
        state.active.retain(|id| id != job_id);
        state.leases.remove(job_id);

        // `attempts_made` was already bumped in `reserve` when this job was
        // moved to ACTIVE, so it already reflects the attempt that just ran.
        let (will_retry, attempts_made) = {
            let job = state.jobs.get(job_id).ok_or_else(|| Self::not_found("job", job_id))?;
            (job.can_retry() && error_code.is_retriable(), job.attempts_made)
        };

        let now_ms = Utc::now().timestamp_millis();
        let job = state.jobs.get_mut(job_id).expect("checked above");
        job.error_code = Some(error_code);
        job.error_message = Some(error_message.to_string());
        job.owner_worker_id = None;

        if will_retry {
            job.status = JobStatus::Delayed;
            let visible_at = now_ms + retry_delay_ms(attempts_made);
            state.delayed.push((job_id.to_string(), visible_at));
        } else {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            state.failed.push(job_id.to_string());
            Self::release_repeat_slot(state, job_id);
        }
        Ok(())
    }

    async fn cancel(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.get_mut(queue).ok_or_else(|| Self::not_found("queue", queue))?;
        let job = state.jobs.get_mut(job_id).ok_or_else(|| Self::not_found("job", job_id))?;
        match job.status {
            JobStatus::Queued => {
                state.waiting.retain(|id| id != job_id);
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
            }
            JobStatus::Delayed => {
                state.delayed.retain(|(id, _)| id != job_id);
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
            }
            JobStatus::Active => {
                job.cancel_requested = true;
            }
            _ => {}
        }
        Ok(())
    }

    async fn release(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.get_mut(queue).ok_or_else(|| Self::not_found("queue", queue))?;
        if let Some(job) = state.jobs.get_mut(job_id) {
            if job.status == JobStatus::Active {
                job.status = JobStatus::Queued;
                job.owner_worker_id = None;
                job.cancel_requested = false;
                state.active.retain(|id| id != job_id);
                state.leases.remove(job_id);
                state.waiting.push(job_id.to_string());
            }
        }
        Ok(())
    }

    async fn get_counts(&self, queue: &str) -> CoreResult<JobCounts> {
        let queues = self.queues.lock().unwrap();
        Ok(match queues.get(queue) {
            Some(s) => JobCounts {
                waiting: s.waiting.len() as u64,
                active: s.active.len() as u64,
                delayed: s.delayed.len() as u64,
                completed: s.completed.len() as u64,
                failed: s.failed.len() as u64,
                paused: s.paused,
            },
            None => JobCounts::default(),
        })
    }

    async fn pause(&self, queue: &str) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.to_string()).or_default().paused = true;
        Ok(())
    }

    async fn resume(&self, queue: &str) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.to_string()).or_default().paused = false;
        Ok(())
    }

    async fn drain(&self, queue: &str) -> CoreResult<u64> {
        let mut queues = self.queues.lock().unwrap();
        let state = match queues.get_mut(queue) {
            Some(s) => s,
            None => return Ok(0),
        };
        let mut removed = 0u64;
        for id in state.waiting.drain(..) {
            state.jobs.remove(&id);
            removed += 1;
        }
        for (id, _) in state.delayed.drain(..) {
            state.jobs.remove(&id);
            removed += 1;
        }
        Ok(removed)
    }

    async fn clean(&self, queue: &str, status: JobStatus, limit: u64) -> CoreResult<u64> {
        let mut queues = self.queues.lock().unwrap();
        let state = match queues.get_mut(queue) {
            Some(s) => s,
            None => return Ok(0),
        };
        let bucket = match status {
            JobStatus::Completed => &mut state.completed,
            JobStatus::Failed => &mut state.failed,
            other => {
                return Err(CoreError::Validation(format!(
                    "clean is only defined for COMPLETED/FAILED, got {other:?}"
                )))
            }
        };
        let take = (limit as usize).min(bucket.len());
        let removed_ids: Vec<String> = bucket.drain(0..take).collect();
        for id in &removed_ids {
            state.jobs.remove(id);
        }
        Ok(removed_ids.len() as u64)
    }

    async fn retry_failed(&self, queue: &str) -> CoreResult<u64> {
        let mut queues = self.queues.lock().unwrap();
        let state = match queues.get_mut(queue) {
            Some(s) => s,
            None => return Ok(0),
        };
        let ids: Vec<String> = state.failed.drain(..).collect();
        for id in &ids {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Queued;
                job.attempts_made = job.attempts_made.saturating_sub(1);
                job.error_code = None;
                job.error_message = None;
                job.finished_at = None;
                state.waiting.push(id.clone());
            }
        }
        Ok(ids.len() as u64)
    }

    async fn retry_job(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.get_mut(queue).ok_or_else(|| Self::not_found("job", job_id))?;
        let job = state.jobs.get(job_id).ok_or_else(|| Self::not_found("job", job_id))?;
        if job.status != JobStatus::Failed {
            return Err(CoreError::Conflict(format!("job {job_id} is {:?}, not FAILED", job.status)));
        }
        state.failed.retain(|id| id != job_id);
        let job = state.jobs.get_mut(job_id).expect("checked above");
        job.status = JobStatus::Queued;
        job.attempts_made = job.attempts_made.saturating_sub(1);
        job.error_code = None;
        job.error_message = None;
        job.finished_at = None;
        state.waiting.push(job_id.to_string());
        Ok(())
    }

    async fn list_jobs(
        &self,
        queue: &str,
        status: Option<JobStatus>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Vec<Job>> {
        let queues = self.queues.lock().unwrap();
        let state = match queues.get(queue) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let mut jobs: Vec<&Job> = state
            .jobs
            .values()
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_job(&self, queue: &str, job_id: &str) -> CoreResult<Option<Job>> {
        let queues = self.queues.lock().unwrap();
        Ok(queues.get(queue).and_then(|s| s.jobs.get(job_id)).cloned())
    }

    async fn reap_expired_leases(&self, queue: &str) -> CoreResult<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut queues = self.queues.lock().unwrap();
        let state = match queues.get_mut(queue) {
            Some(s) => s,
            None => return Ok(0),
        };
        let expired: Vec<String> = state
            .leases
            .iter()
            .filter(|(_, &expiry)| expiry <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            state.leases.remove(id);
            state.active.retain(|a| a != id);
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Queued;
                job.owner_worker_id = None;
                job.cancel_requested = false;
                state.waiting.push(id.clone());
            }
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_then_reserve_then_ack() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({"a": 1}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = queue.reserve("cafe-jobs", "worker-1").await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.status, JobStatus::Active);
        queue.ack("cafe-jobs", &job_id, None).await.unwrap();
        let counts = queue.get_counts("cafe-jobs").await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn pause_blocks_reserve_drain_leaves_active_alone() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        queue.pause("cafe-jobs").await.unwrap();
        assert!(queue.reserve("cafe-jobs", "w").await.unwrap().is_none());
        let counts = queue.get_counts("cafe-jobs").await.unwrap();
        assert!(counts.paused);

        queue.resume("cafe-jobs").await.unwrap();
        let job = queue.reserve("cafe-jobs", "w").await.unwrap().unwrap();
        queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let removed = queue.drain("cafe-jobs").await.unwrap();
        assert_eq!(removed, 1);
        let counts = queue.get_counts("cafe-jobs").await.unwrap();
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.delayed, 0);
        assert_eq!(counts.active, 1);
        assert_eq!(job.status, JobStatus::Active);
    }

    #[tokio::test]
    async fn repeatable_job_is_single_flight() {
        let queue = InMemoryJobQueue::new();
        let opts = EnqueueOptions {
            repeat: Some(dispatch_core::RepeatOptions {
                every_ms: 60_000,
                job_id: "stats-snapshot-collector".into(),
            }),
            ..Default::default()
        };
        let first = queue
            .enqueue("system", "SNAPSHOT_TICK", json!({}), opts.clone())
            .await
            .unwrap();
        let second = queue.enqueue("system", "SNAPSHOT_TICK", json!({}), opts.clone()).await.unwrap();
        assert_eq!(first, second);

        let job = queue.reserve("system", "w").await.unwrap().unwrap();
        queue.ack("system", &job.id, None).await.unwrap();
        let third = queue.enqueue("system", "SNAPSHOT_TICK", json!({}), opts).await.unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn expired_lease_is_reaped_without_a_second_attempt_bump() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = queue.reserve("cafe-jobs", "w").await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        // `reserve` already counted this pickup as an attempt (BullMQ
        // semantics); reaping the abandoned lease hands the job back to
        // WAITING without bumping the counter a second time.
        assert_eq!(job.attempts_made, 1);
        {
            let mut queues = queue.queues.lock().unwrap();
            let state = queues.get_mut("cafe-jobs").unwrap();
            state.leases.insert(job_id.clone(), 0);
        }
        let reaped = queue.reap_expired_leases("cafe-jobs").await.unwrap();
        assert_eq!(reaped, 1);
        let job = queue.get_job("cafe-jobs", &job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn retry_job_requeues_a_single_failed_job_preserving_its_id() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = queue.reserve("cafe-jobs", "w").await.unwrap().unwrap();
        queue
            .fail("cafe-jobs", &job.id, ErrorCode::PermissionDenied, "nope")
            .await
            .unwrap();
        let failed = queue.get_job("cafe-jobs", &job_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        queue.retry_job("cafe-jobs", &job_id).await.unwrap();
        let retried = queue.get_job("cafe-jobs", &job_id).await.unwrap().unwrap();
        assert_eq!(retried.id, job_id);
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.attempts_made, 0);
    }

    #[tokio::test]
    async fn retry_job_rejects_non_terminal_jobs() {
        let queue = InMemoryJobQueue::new();
        let job_id = queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let err = queue.retry_job("cafe-jobs", &job_id).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
}
