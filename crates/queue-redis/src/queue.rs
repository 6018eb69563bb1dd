//! `RedisJobQueue` — the `JobQueue` contract backed by Redis lists, sorted
//! sets and hashes (see `keys.rs` for the layout, `scripts.rs` for the
//! atomic Lua operations).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dispatch_core::{
    retry_delay_ms, CoreError, CoreResult, EnqueueOptions, ErrorCode, Job, JobCounts, JobQueue,
    JobStatus,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::error::map_redis_err;
use crate::job_fields::{error_code_to_str, from_hash, sort_score, to_hash_fields};
use crate::keys::QueueKeys;
use crate::scripts;

/// Lease duration an ACTIVE job holds in the `active` zset before a reaper
/// would consider it abandoned — generous relative to the 5 minute default
/// handler timeout (spec.md §4.3) so a slow-but-alive worker isn't raced.
const RESERVE_LEASE_MS: i64 = 10 * 60 * 1000;

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn keys(queue: &str) -> QueueKeys {
        QueueKeys::new(queue)
    }

    async fn eval<T: redis::FromRedisValue>(
        &self,
        src: &str,
        keys: &[String],
        argv: &[String],
    ) -> CoreResult<T> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(src);
        let mut invocation = script.key(&keys[0]);
        for key in &keys[1..] {
            invocation = invocation.key(key);
        }
        for a in argv {
            invocation = invocation.arg(a);
        }
        invocation.invoke_async(&mut conn).await.map_err(map_redis_err)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        payload: Value,
        opts: EnqueueOptions,
    ) -> CoreResult<String> {
        let mut job = Job::new(queue, job_type, payload);
        job.user_id = opts.user_id;
        job.schedule_run_id = opts.schedule_run_id;
        job.sequence_number = opts.sequence_number;
        job.priority = opts.priority.unwrap_or(0);
        job.max_attempts = opts.attempts.unwrap_or(3);

        let now_ms = Utc::now().timestamp_millis();
        let score = sort_score(job.priority, now_ms);
        let delay_until = opts.delay_ms.map(|d| now_ms + d);
        if delay_until.is_some() {
            job.status = JobStatus::Delayed;
        }

        let keys = Self::keys(queue);
        let repeat_job_id = opts.repeat.as_ref().map(|r| r.job_id.clone());
        let repeat_key = repeat_job_id
            .as_deref()
            .map(|id| keys.repeat(id))
            .unwrap_or_else(|| keys.repeat("__none__"));

        let fields = to_hash_fields(&job, score);
        let mut argv: Vec<String> = vec![
            job.id.clone(),
            score.to_string(),
            if delay_until.is_some() { "1".into() } else { "0".into() },
            delay_until.unwrap_or(0).to_string(),
            if repeat_job_id.is_some() { "1".into() } else { "0".into() },
        ];
        for (k, v) in &fields {
            argv.push((*k).to_string());
            argv.push(v.clone());
        }

        let script_keys = [keys.job(&job.id), keys.waiting(), keys.delayed(), repeat_key];
        let result: String = self.eval(scripts::ENQUEUE, &script_keys, &argv).await?;
        Ok(result)
    }

    async fn reserve(&self, queue: &str, worker_id: &str) -> CoreResult<Option<Job>> {
        let keys = Self::keys(queue);
        let now_ms = Utc::now().timestamp_millis();

        let script_keys = [
            keys.waiting(),
            keys.delayed(),
            keys.job_prefix(),
            keys.active(),
            keys.paused(),
        ];
        let argv = [now_ms.to_string(), RESERVE_LEASE_MS.to_string(), worker_id.to_string()];
        let job_id: Option<String> = self.eval(scripts::RESERVE, &script_keys, &argv).await?;

        let job_id = match job_id {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(None),
        };

        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> =
            conn.hgetall(keys.job(&job_id)).await.map_err(map_redis_err)?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(from_hash(hash)?))
    }

    async fn ack(&self, queue: &str, job_id: &str, return_value: Option<Value>) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let now_ms = Utc::now().timestamp_millis();
        let return_json = return_value.map(|v| v.to_string()).unwrap_or_default();

        let script_keys = [keys.job(job_id), keys.active(), keys.completed()];
        // remove_on_complete defaults to "keep" here; bulk pruning happens
        // via the explicit `clean` operation rather than per-ack trimming.
        let argv = [job_id.to_string(), return_json, now_ms.to_string(), "1".to_string()];
        let _: i64 = self.eval(scripts::ACK, &script_keys, &argv).await?;
        Ok(())
    }

    async fn fail(
        &self,
        queue: &str,
        job_id: &str,
        error_code: ErrorCode,
        error_message: &str,
    ) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();

        let hash: HashMap<String, String> =
            conn.hgetall(keys.job(job_id)).await.map_err(map_redis_err)?;
        if hash.is_empty() {
            return Err(CoreError::NotFound(format!("job {job_id} not found")));
        }
        let job = from_hash(hash)?;

        // `attempts_made` was already bumped by `RESERVE`'s `HINCRBY` when
        // this job was moved to ACTIVE, so the count handed back here is
        // the attempt that just ran — not one more than it.
        let attempts_made = job.attempts_made;
        let will_retry = job.can_retry() && error_code.is_retriable();
        let now_ms = Utc::now().timestamp_millis();
        let error_code_str = error_code_to_str(error_code);

        let script_keys = [
            keys.job(job_id),
            keys.active(),
            keys.waiting(),
            keys.delayed(),
            keys.failed(),
        ];

        let argv = if will_retry {
            let visible_at = now_ms + retry_delay_ms(attempts_made);
            vec![
                job_id.to_string(),
                error_code_str.to_string(),
                error_message.to_string(),
                "1".to_string(),
                attempts_made.to_string(),
                visible_at.to_string(),
                "0".to_string(),
                "1".to_string(),
            ]
        } else {
            vec![
                job_id.to_string(),
                error_code_str.to_string(),
                error_message.to_string(),
                "0".to_string(),
                attempts_made.to_string(),
                "0".to_string(),
                now_ms.to_string(),
                "1".to_string(),
            ]
        };

        let _: i64 = self.eval(scripts::FAIL, &script_keys, &argv).await?;
        Ok(())
    }

    async fn cancel(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let script_keys = [keys.job(job_id), keys.waiting(), keys.delayed()];
        let argv = [job_id.to_string()];
        let _: i64 = self.eval(scripts::CANCEL, &script_keys, &argv).await?;
        Ok(())
    }

    async fn release(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let script_keys = [keys.job(job_id), keys.active(), keys.waiting()];
        let argv = [job_id.to_string()];
        let _: i64 = self.eval(scripts::RELEASE, &script_keys, &argv).await?;
        Ok(())
    }

    async fn get_counts(&self, queue: &str) -> CoreResult<JobCounts> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let (waiting, active, delayed, completed, failed, paused): (u64, u64, u64, u64, u64, bool) =
            redis::pipe()
                .zcard(keys.waiting())
                .zcard(keys.active())
                .zcard(keys.delayed())
                .zcard(keys.completed())
                .zcard(keys.failed())
                .exists(keys.paused())
                .query_async(&mut conn)
                .await
                .map_err(map_redis_err)?;
        Ok(JobCounts { waiting, active, delayed, completed, failed, paused })
    }

    async fn pause(&self, queue: &str) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let _: () = conn.set(keys.paused(), 1).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn resume(&self, queue: &str) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys.paused()).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn drain(&self, queue: &str) -> CoreResult<u64> {
        let keys = Self::keys(queue);
        let script_keys = [keys.waiting(), keys.delayed(), keys.job_prefix()];
        self.eval(scripts::DRAIN, &script_keys, &[]).await
    }

    async fn clean(&self, queue: &str, status: JobStatus, limit: u64) -> CoreResult<u64> {
        let keys = Self::keys(queue);
        let status_zset = match status {
            JobStatus::Completed => keys.completed(),
            JobStatus::Failed => keys.failed(),
            other => {
                return Err(CoreError::Validation(format!(
                    "clean is only defined for COMPLETED/FAILED, got {other:?}"
                )))
            }
        };
        // Everything already recorded in the terminal zset is eligible;
        // retention-by-age is the caller's (`dispatch-scheduler`) concern —
        // it re-invokes `clean` on a timer rather than this trait tracking
        // a cutoff itself.
        let cutoff_ms = Utc::now().timestamp_millis();
        let script_keys = [status_zset, keys.job_prefix()];
        let argv = [cutoff_ms.to_string(), limit.to_string()];
        self.eval(scripts::CLEAN, &script_keys, &argv).await
    }

    async fn retry_failed(&self, queue: &str) -> CoreResult<u64> {
        let keys = Self::keys(queue);
        let script_keys = [keys.failed(), keys.job_prefix(), keys.waiting()];
        self.eval(scripts::RETRY_FAILED, &script_keys, &[]).await
    }

    async fn retry_job(&self, queue: &str, job_id: &str) -> CoreResult<()> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> =
            conn.hgetall(keys.job(job_id)).await.map_err(map_redis_err)?;
        if hash.is_empty() {
            return Err(CoreError::NotFound(format!("job {job_id} not found")));
        }
        let job = from_hash(hash)?;
        if job.status != JobStatus::Failed {
            return Err(CoreError::Conflict(format!(
                "job {job_id} is {:?}, not FAILED",
                job.status
            )));
        }

        let script_keys = [keys.job(job_id), keys.failed(), keys.waiting()];
        let argv = [job_id.to_string()];
        let moved: i64 = self.eval(scripts::RETRY_JOB, &script_keys, &argv).await?;
        if moved == 0 {
            return Err(CoreError::Conflict(format!("job {job_id} is not FAILED")));
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        queue: &str,
        status: Option<JobStatus>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Vec<Job>> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let zset = match status {
            Some(JobStatus::Completed) => keys.completed(),
            Some(JobStatus::Failed) => keys.failed(),
            Some(JobStatus::Delayed) => keys.delayed(),
            Some(JobStatus::Queued) | None => keys.waiting(),
            Some(JobStatus::Active) => keys.active(),
            Some(JobStatus::Cancelled) => {
                // Cancelled jobs are not indexed in their own zset; they
                // remain addressable only by id until a `clean` pass.
                return Ok(Vec::new());
            }
        };
        let ids: Vec<String> = conn
            .zrange(zset, offset as isize, (offset + limit).saturating_sub(1) as isize)
            .await
            .map_err(map_redis_err)?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let hash: HashMap<String, String> =
                conn.hgetall(keys.job(&id)).await.map_err(map_redis_err)?;
            if !hash.is_empty() {
                jobs.push(from_hash(hash)?);
            }
        }
        Ok(jobs)
    }

    async fn get_job(&self, queue: &str, job_id: &str) -> CoreResult<Option<Job>> {
        let keys = Self::keys(queue);
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> =
            conn.hgetall(keys.job(job_id)).await.map_err(map_redis_err)?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(from_hash(hash)?))
    }

    async fn reap_expired_leases(&self, queue: &str) -> CoreResult<u64> {
        let keys = Self::keys(queue);
        let now_ms = Utc::now().timestamp_millis();
        let script_keys = [keys.waiting(), keys.active(), keys.job_prefix()];
        let argv = [now_ms.to_string()];
        self.eval(scripts::REAP_EXPIRED, &script_keys, &argv).await
    }
}
