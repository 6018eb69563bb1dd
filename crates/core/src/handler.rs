//! The job handler plug-in interface (spec.md §6) — the only seam between
//! this core and the content-posting code. Generalizes the teacher's
//! `CommandRegistry` (`crates/seesaw/src/lib.rs` re-export) into a
//! `type -> handler` map closed at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::job::{ErrorCode, Job};

/// What a handler returns. Replaces "exceptions for control flow" in the
/// original source (spec.md §9) with an explicit outcome type.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Ok { return_value: Option<Value> },
    Err { error_code: ErrorCode, message: String },
}

/// Cooperative cancellation flag a handler should poll during long work
/// (spec.md §5 "the handler periodically checks a cancellation flag").
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to a handler invocation (spec.md §4.3).
pub struct HandlerContext {
    pub job_id: String,
    pub cancel: CancelFlag,
}

impl HandlerContext {
    pub fn log(&self, level: tracing::Level, msg: &str) {
        match level {
            tracing::Level::ERROR => tracing::error!(job_id = %self.job_id, "{msg}"),
            tracing::Level::WARN => tracing::warn!(job_id = %self.job_id, "{msg}"),
            tracing::Level::INFO => tracing::info!(job_id = %self.job_id, "{msg}"),
            _ => tracing::debug!(job_id = %self.job_id, "{msg}"),
        }
    }

    /// Used by the Schedule Planner's Run counters — a handler reports
    /// its position within a `ScheduleRun` as it progresses.
    pub fn report_progress(
        &self,
        index: u32,
        total: u32,
        result: crate::run::RunJobResult,
        error_code: Option<ErrorCode>,
    ) {
        tracing::info!(
            job_id = %self.job_id,
            index,
            total,
            result = ?result,
            error_code = ?error_code,
            "job progress"
        );
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> HandlerOutcome;

    /// Per-handler concurrency. Posting work defaults to 1 (not safely
    /// parallel for one user's session); system jobs may raise this.
    fn concurrency(&self) -> usize {
        1
    }

    /// Per-job wall-clock timeout; defaults to 5 minutes (spec.md §4.3).
    fn timeout_ms(&self) -> i64 {
        5 * 60 * 1000
    }
}

/// Closed `type -> handler` map, populated once at startup. Enqueueing an
/// unregistered job type is rejected with `VALIDATION_ERROR` (spec.md
/// §4.1/§9).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn handle(&self, _job: &Job, _ctx: &HandlerContext) -> HandlerOutcome {
            HandlerOutcome::Ok { return_value: None }
        }
    }

    #[test]
    fn registry_rejects_unknown_types() {
        let mut registry = HandlerRegistry::new();
        registry.register("CREATE_POST", Arc::new(NoopHandler));
        assert!(registry.is_registered("CREATE_POST"));
        assert!(!registry.is_registered("DELETE_POST"));
    }

    #[test]
    fn cancel_flag_round_trips() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        // Clones observe the same underlying flag.
        let clone = flag.clone();
        assert!(clone.is_cancelled());
    }
}
