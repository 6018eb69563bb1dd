//! # dispatch-worker
//!
//! The Worker Pool (spec.md §4.3): polls a [`dispatch_core::JobQueue`],
//! dispatches reserved jobs to registered [`dispatch_core::JobHandler`]s
//! under per-type concurrency limits and per-job timeouts, and reports
//! liveness through a [`dispatch_core::HeartbeatRegistry`].

mod config;
mod pool;

pub use config::WorkerPoolConfig;
pub use pool::WorkerPool;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use dispatch_core::{
        EnqueueOptions, ErrorCode, HandlerContext, HandlerOutcome, HandlerRegistry, HeartbeatRegistry,
        Job, JobHandler, JobQueue, JobStatus,
    };
    use dispatch_testing::{InMemoryHeartbeatRegistry, InMemoryJobQueue};

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn handle(&self, job: &Job, _ctx: &HandlerContext) -> HandlerOutcome {
            HandlerOutcome::Ok { return_value: Some(job.payload.clone()) }
        }
    }

    struct AlwaysFailsHandler;

    #[async_trait]
    impl JobHandler for AlwaysFailsHandler {
        async fn handle(&self, _job: &Job, _ctx: &HandlerContext) -> HandlerOutcome {
            HandlerOutcome::Err { error_code: ErrorCode::NetworkError, message: "boom".to_string() }
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl JobHandler for SlowHandler {
        async fn handle(&self, _job: &Job, ctx: &HandlerContext) -> HandlerOutcome {
            loop {
                if ctx.cancel.is_cancelled() {
                    return HandlerOutcome::Err {
                        error_code: ErrorCode::Unknown,
                        message: "cancelled".to_string(),
                    };
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        fn timeout_ms(&self) -> i64 {
            50
        }
    }

    fn handlers(job_type: &str, handler: Arc<dyn JobHandler>) -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry.register(job_type, handler);
        Arc::new(registry)
    }

    #[tokio::test]
    async fn processes_a_job_to_completion() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({"n": 1}), EnqueueOptions::default())
            .await
            .unwrap();

        let config = WorkerPoolConfig::new("cafe-jobs").with_worker_id("w1");
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            registry,
            handlers("CREATE_POST", Arc::new(EchoHandler)),
            None,
            config,
        ));

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(pool.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        run_handle.await.unwrap();

        let counts = queue.get_counts("cafe-jobs").await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn retriable_failure_goes_back_to_waiting() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        queue
            .enqueue("cafe-jobs", "CREATE_POST", json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let config = WorkerPoolConfig::new("cafe-jobs").with_worker_id("w1");
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            registry,
            handlers("CREATE_POST", Arc::new(AlwaysFailsHandler)),
            None,
            config,
        ));

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(pool.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        run_handle.await.unwrap();

        let job = queue
            .list_jobs("cafe-jobs", None, 0, 10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_ne!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn timed_out_handler_is_cancelled_and_retried() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        queue
            .enqueue("cafe-jobs", "SLOW", json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let mut config = WorkerPoolConfig::new("cafe-jobs").with_worker_id("w1");
        config.cancellation_grace = Duration::from_millis(200);
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            registry,
            handlers("SLOW", Arc::new(SlowHandler)),
            None,
            config,
        ));

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(pool.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
        run_handle.await.unwrap();

        let job = queue
            .list_jobs("cafe-jobs", None, 0, 10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn graceful_shutdown_removes_worker_from_registry() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let registry = Arc::new(InMemoryHeartbeatRegistry::new());
        let config = WorkerPoolConfig::new("cafe-jobs").with_worker_id("w1");
        let pool = Arc::new(WorkerPool::new(
            queue,
            registry.clone(),
            handlers("CREATE_POST", Arc::new(EchoHandler)),
            None,
            config,
        ));

        let shutdown = CancellationToken::new();
        let run_handle = tokio::spawn(pool.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        run_handle.await.unwrap();

        assert_eq!(registry.count_online().await.unwrap(), 0);
    }
}
