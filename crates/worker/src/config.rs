use std::time::Duration;

use uuid::Uuid;

/// Configuration for one [`crate::WorkerPool`] instance (spec.md §4.3/§5).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Queue this pool drains — e.g. `"cafe-jobs"` or `"system"`.
    pub queue_name: String,
    /// `host:pid`-style id, also the Heartbeat Registry member key.
    pub worker_id: String,
    /// Number of concurrent `reserve` loops this process runs against
    /// `queue_name`. Per-handler concurrency is still enforced on top of
    /// this via each [`dispatch_core::JobHandler::concurrency`].
    pub poll_loops: usize,
    /// How long to sleep between empty `reserve` calls before trying again.
    pub empty_poll_backoff: Duration,
    /// Heartbeat write period (spec.md §4.2 `HEARTBEAT_PERIOD_MS`).
    pub heartbeat_interval: Duration,
    /// Grace period on shutdown to let in-flight jobs finish before their
    /// still-ACTIVE jobs are released back to the queue (spec.md §4.3).
    pub shutdown_grace: Duration,
    /// Extra time given to an already-timed-out handler to honor
    /// cooperative cancellation before its task is forcibly aborted.
    pub cancellation_grace: Duration,
}

impl WorkerPoolConfig {
    pub fn new(queue_name: impl Into<String>) -> Self {
        let host = hostname();
        let pid = std::process::id();
        Self {
            queue_name: queue_name.into(),
            worker_id: format!("{host}:{pid}:{}", &Uuid::new_v4().to_string()[..8]),
            poll_loops: 1,
            empty_poll_backoff: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            cancellation_grace: Duration::from_secs(5),
        }
    }

    pub fn with_poll_loops(mut self, n: usize) -> Self {
        self.poll_loops = n.max(1);
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }
}

/// `host` half of `workerId = host + ":" + pid` (spec.md §3). `HOSTNAME` is
/// set in every container runtime this service deploys to; a bare
/// `"localhost"` fallback is fine for local/dev runs.
fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
