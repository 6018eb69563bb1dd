//! # dispatch-core
//!
//! Domain types, storage seams, and pure decision logic for the job
//! execution and operational-control core behind the posting scheduler.
//!
//! ## Architecture
//!
//! ```text
//! Schedule/template store (out of scope) ──┐
//!                                          ▼
//!                              ScheduleDirectory (seam)
//!                                          │
//!                              dispatch-scheduler
//!                                 │        │         │
//!                    Policy Gate  │  Snapshot/Incident │
//!                   (pure, here)  │  Collector/Detector │
//!                                 ▼        (pure, here)  │
//!                           JobQueue (trait) ◄────────────┘
//!                                 │
//!                          dispatch-queue-redis
//!                                 │
//!                           dispatch-worker
//!                                 │
//!                          JobHandler (your code)
//! ```
//!
//! ## Key invariants
//!
//! 1. **Machines are pure** — `policy`, `backoff`, `run`, `snapshot`, and
//!    `incident` contain no IO. Callers gather inputs and hand them in.
//! 2. **Storage is split by access pattern** — `Job` is canonical in the
//!    key-value store behind [`JobQueue`]; `ScheduleRun`, `QueueStatsSnapshot`,
//!    `Incident`, and `AuditLogEntry` are canonical in the relational store
//!    behind the traits in [`store`].
//! 3. **External subsystems are seams, not dependencies** — [`external`]
//!    defines the narrow traits this core needs from the (out-of-scope)
//!    auth/session and schedule/template subsystems.
//! 4. **At-least-once delivery** — a claimed job surviving a worker crash is
//!    reclaimed by heartbeat expiry; handlers must be idempotent or detect
//!    duplicates themselves (see [`policy::PolicyInput::duplicate_create_post_exists`]).

mod audit;
mod backoff;
mod error;
mod external;
mod handler;
mod incident;
mod job;
mod policy;
mod queue;
mod registry;
mod run;
mod snapshot;
mod store;

// Re-export error types
pub use crate::error::{CoreError, CoreResult};

// Re-export job types
pub use job::{EnqueueOptions, ErrorCode, Job, JobCounts, JobStatus, RepeatOptions};

// Re-export backoff calculation
pub use backoff::{base_delay_ms, retry_delay_ms, BASE_MS, CAP_MS, JITTER};

// Re-export queue and heartbeat registry traits
pub use queue::JobQueue;
pub use registry::{HeartbeatRegistry, WorkerInfo, HEARTBEAT_PERIOD_MS, ONLINE_THRESHOLD_MS};

// Re-export handler plug-in interface
pub use handler::{CancelFlag, HandlerContext, HandlerOutcome, HandlerRegistry, JobHandler};

// Re-export Run types and pure status derivation
pub use run::{derive_run_status, DerivedRunStatus, RunJobEvent, RunJobResult, RunStatus, ScheduleRun};

// Re-export snapshot types
pub use snapshot::{compute_jobs_per_min, QueueStatsSnapshot};

// Re-export incident types and detection rules
pub use incident::{
    detect_high_failure_rate, detect_queue_backlog, detect_worker_down, DetectedCondition,
    Incident, IncidentStatus, IncidentType, Severity, AUTO_RESOLVE_AFTER_SECS,
};

// Re-export audit types
pub use audit::{ActorType, AuditFilter, AuditLogEntry};

// Re-export relational store traits
pub use store::{AuditStore, IncidentStore, RunStore, SnapshotStore};

// Re-export the Policy Gate
pub use policy::{
    evaluate_policy, should_auto_suspend, AdminStatus, PolicyBlock, PolicyInput, SessionStatus,
    DEFAULT_AUTO_SUSPEND_THRESHOLD,
};

// Re-export external seams
pub use external::{RunProgressSink, ScheduleConfig, ScheduleDirectory, SessionStatusSink};

// Re-export commonly used external types
pub use async_trait::async_trait;
