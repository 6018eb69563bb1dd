//! `WorkerPool` — drains a [`JobQueue`], dispatches to registered
//! [`JobHandler`]s, and reports fleet statistics through the
//! [`HeartbeatRegistry`] (spec.md §4.3).
//!
//! Grounded on `fourthplaces-mntogether/packages/server/src/kernel/jobs/worker.rs`'s
//! `JobWorker`: a `running_jobs: RwLock<HashMap<_, CancellationToken>>` for
//! cooperative per-job cancellation, a heartbeat task running alongside job
//! execution, and a shutdown sequence that stops polling, waits for
//! in-flight work, then reclaims what's left — adapted from that file's
//! single Postgres-backed job type to this spec's multi-handler, per-type
//! concurrency model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dispatch_core::{
    CancelFlag, ErrorCode, HandlerContext, HandlerRegistry, HeartbeatRegistry, Job, JobHandler,
    JobQueue, RunProgressSink, SessionStatus, SessionStatusSink,
};

use crate::config::WorkerPoolConfig;

/// Running counters reported on every heartbeat (spec.md §3 `WorkerInfo`).
#[derive(Default)]
struct Counters {
    active_jobs: AtomicU32,
    processed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    registry: Arc<dyn HeartbeatRegistry>,
    handlers: Arc<HandlerRegistry>,
    session_sink: Option<Arc<dyn SessionStatusSink>>,
    run_progress: Option<Arc<dyn RunProgressSink>>,
    config: WorkerPoolConfig,
    counters: Arc<Counters>,
    /// One semaphore per registered job type, sized to that handler's
    /// declared concurrency — enforced independently of `poll_loops` so a
    /// single-concurrency handler (posting work) never runs two jobs at
    /// once even if several poll loops race to reserve one each.
    semaphores: StdMutex<HashMap<String, Arc<Semaphore>>>,
    /// Jobs this process currently holds ACTIVE, for cooperative
    /// cancellation and graceful-shutdown release.
    running: Arc<RwLock<HashMap<String, CancelFlag>>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<dyn HeartbeatRegistry>,
        handlers: Arc<HandlerRegistry>,
        session_sink: Option<Arc<dyn SessionStatusSink>>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            handlers,
            session_sink,
            run_progress: None,
            config,
            counters: Arc::new(Counters::default()),
            semaphores: StdMutex::new(HashMap::new()),
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wires a [`RunProgressSink`] so terminal jobs carrying a
    /// `scheduleRunId` bump that Run's counters (spec.md §4.4).
    pub fn with_run_progress(mut self, sink: Arc<dyn RunProgressSink>) -> Self {
        self.run_progress = Some(sink);
        self
    }

    fn semaphore_for(&self, job_type: &str, concurrency: usize) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().unwrap();
        semaphores
            .entry(job_type.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(concurrency)))
            .clone()
    }

    /// Runs until `shutdown` is triggered, then drains in-flight work and
    /// releases anything still owned (spec.md §4.3 "on process shutdown").
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            worker_id = %self.config.worker_id,
            queue = %self.config.queue_name,
            poll_loops = self.config.poll_loops,
            "worker pool starting"
        );

        let heartbeat_task = tokio::spawn({
            let pool = self.clone();
            let shutdown = shutdown.clone();
            async move { pool.heartbeat_loop(shutdown).await }
        });

        let poll_tasks: Vec<_> = (0..self.config.poll_loops)
            .map(|_| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.poll_loop(shutdown).await })
            })
            .collect();

        join_all(poll_tasks).await;

        self.drain_and_release().await;

        shutdown.cancel();
        let _ = heartbeat_task.await;

        if let Err(e) = self.registry.remove(&self.config.worker_id).await {
            warn!(worker_id = %self.config.worker_id, error = %e, "failed to remove worker from heartbeat registry");
        }

        info!(worker_id = %self.config.worker_id, "worker pool stopped");
    }

    async fn poll_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            match self.queue.reserve(&self.config.queue_name, &self.config.worker_id).await {
                Ok(Some(job)) => self.dispatch(job).await,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(self.config.empty_poll_backoff) => {}
                    }
                }
                Err(e) => {
                    error!(queue = %self.config.queue_name, error = %e, "reserve failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }
    }

    async fn dispatch(&self, job: Job) {
        let handler = match self.handlers.get(&job.job_type) {
            Some(h) => h,
            None => {
                // Closed dispatch set (spec.md §9): an unregistered type
                // should have been rejected at enqueue; if one slips
                // through anyway, fail it terminally rather than stall it.
                error!(job_id = %job.id, job_type = %job.job_type, "no handler registered for job type");
                if let Err(e) = self
                    .queue
                    .fail(&job.queue, &job.id, ErrorCode::Unknown, "no handler registered for job type")
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to mark unroutable job as failed");
                }
                return;
            }
        };

        let concurrency = handler.concurrency();
        let semaphore = self.semaphore_for(&job.job_type, concurrency);
        let permit = match semaphore.acquire_owned().await {
            Ok(p) => p,
            Err(_) => return, // semaphore closed; pool is shutting down
        };

        self.counters.active_jobs.fetch_add(1, Ordering::SeqCst);
        let cancel_flag = CancelFlag::new();
        self.running.write().await.insert(job.id.clone(), cancel_flag.clone());

        let timeout = Duration::from_millis(handler.timeout_ms().max(0) as u64);
        let outcome = self.run_with_timeout(handler, job.clone(), cancel_flag.clone(), timeout).await;

        self.running.write().await.remove(&job.id);
        self.counters.active_jobs.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        self.finish(job, outcome).await;
    }

    /// Runs the handler in its own task so a panic inside it (spec.md
    /// §4.3 "On unexpected panic/exception") surfaces as a `JoinError`
    /// instead of crashing this poll loop, and races it against the
    /// per-job timeout with a cooperative-cancellation grace period.
    async fn run_with_timeout(
        &self,
        handler: Arc<dyn JobHandler>,
        job: Job,
        cancel_flag: CancelFlag,
        timeout: Duration,
    ) -> dispatch_core::HandlerOutcome {
        use dispatch_core::HandlerOutcome;

        let ctx = HandlerContext { job_id: job.id.clone(), cancel: cancel_flag.clone() };
        let mut task = tokio::spawn(async move { handler.handle(&job, &ctx).await });

        tokio::select! {
            res = &mut task => match res {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => HandlerOutcome::Err {
                    error_code: ErrorCode::Unknown,
                    message: format!("handler panicked: {e}"),
                },
                Err(e) => HandlerOutcome::Err {
                    error_code: ErrorCode::Unknown,
                    message: format!("handler task did not complete: {e}"),
                },
            },
            _ = tokio::time::sleep(timeout) => {
                cancel_flag.cancel();
                match tokio::time::timeout(self.config.cancellation_grace, &mut task).await {
                    Ok(Ok(outcome)) => outcome,
                    _ => {
                        task.abort();
                        HandlerOutcome::Err {
                            error_code: ErrorCode::Timeout,
                            message: "handler did not complete within its timeout".to_string(),
                        }
                    }
                }
            }
        }
    }

    async fn finish(&self, job: Job, outcome: dispatch_core::HandlerOutcome) {
        use dispatch_core::HandlerOutcome;

        let succeeded = matches!(outcome, HandlerOutcome::Ok { .. });

        match outcome {
            HandlerOutcome::Ok { return_value } => {
                if let Err(e) = self.queue.ack(&job.queue, &job.id, return_value).await {
                    error!(job_id = %job.id, error = %e, "failed to ack job");
                }
                self.counters.processed_jobs.fetch_add(1, Ordering::SeqCst);
                debug!(job_id = %job.id, job_type = %job.job_type, "job completed");
            }
            HandlerOutcome::Err { error_code, message } => {
                warn!(job_id = %job.id, job_type = %job.job_type, error_code = ?error_code, "job failed: {message}");
                if let Err(e) = self.queue.fail(&job.queue, &job.id, error_code, &message).await {
                    error!(job_id = %job.id, error = %e, "failed to mark job as failed");
                }
                self.counters.failed_jobs.fetch_add(1, Ordering::SeqCst);

                if error_code.is_session_fatal() {
                    if let (Some(sink), Some(user_id)) = (&self.session_sink, &job.user_id) {
                        let status = match error_code {
                            ErrorCode::AuthExpired => SessionStatus::Expired,
                            ErrorCode::ChallengeRequired => SessionStatus::ChallengeRequired,
                            _ => SessionStatus::Error,
                        };
                        if let Err(e) = sink.set_session_status(user_id, status).await {
                            error!(user_id = %user_id, error = %e, "failed to update session status");
                        }
                    }
                }
            }
        }

        // Only a job's *permanent* outcome (completed, or failed with no
        // retries left) moves a Run's counters; a retriable failure leaves
        // the job DELAYED and the Run untouched (spec.md §4.4).
        let job_is_terminal = match self.queue.get_job(&job.queue, &job.id).await {
            Ok(Some(latest)) => latest.status.is_terminal(),
            _ => succeeded,
        };
        if job_is_terminal && job.schedule_run_id.is_some() {
            if let Some(sink) = &self.run_progress {
                if let Err(e) = sink.record_job_terminal(&job, succeeded).await {
                    error!(job_id = %job.id, error = %e, "failed to record run progress");
                }
            }
        }
    }

    async fn heartbeat_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        let started_at = chrono::Utc::now();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let info = dispatch_core::WorkerInfo {
                        worker_id: self.config.worker_id.clone(),
                        queue_name: self.config.queue_name.clone(),
                        started_at,
                        active_jobs: self.counters.active_jobs.load(Ordering::SeqCst),
                        processed_jobs: self.counters.processed_jobs.load(Ordering::SeqCst),
                        failed_jobs: self.counters.failed_jobs.load(Ordering::SeqCst),
                    };
                    if let Err(e) = self.registry.heartbeat(&info).await {
                        warn!(worker_id = %self.config.worker_id, error = %e, "heartbeat write failed");
                    }
                }
            }
        }
    }

    /// Waits up to `shutdown_grace` for in-flight jobs to finish on their
    /// own, then releases anything still ACTIVE back to WAITING so a
    /// replacement worker can pick it up (spec.md §4.3).
    async fn drain_and_release(&self) {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        loop {
            if self.running.read().await.is_empty() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining: Vec<String> = self.running.read().await.keys().cloned().collect();
        if remaining.is_empty() {
            return;
        }
        info!(count = remaining.len(), "releasing still-active jobs on shutdown");
        for job_id in remaining {
            // Signal cooperative cancellation in case the handler is still
            // watching its flag, then hand the job back to the queue
            // regardless — a replacement worker must not wait on us.
            if let Some(flag) = self.running.read().await.get(&job_id) {
                flag.cancel();
            }
            if let Err(e) = self.queue.release(&self.config.queue_name, &job_id).await {
                error!(job_id = %job_id, error = %e, "failed to release job on shutdown");
            }
        }
    }
}
