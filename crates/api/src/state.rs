//! Shared application state, handed to every handler via axum's `State`
//! extractor — the same "global collaborators passed by reference"
//! discipline `dispatch-worker`/`dispatch-scheduler` already follow
//! (spec.md §9), not package-level statics.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use dispatch_core::{AuditStore, HeartbeatRegistry, IncidentStore, JobQueue, RunStore, SnapshotStore};
use dispatch_scheduler::IncidentDetector;

/// A Run's counters as last reported to a dashboard poller, kept for
/// [`DashboardCache::clamp`]'s monotonic-progression guarantee (spec.md §9
/// "Async-polling UI contract").
#[derive(Clone, Copy)]
struct ObservedCounters {
    completed_jobs: u32,
    failed_jobs: u32,
    observed_at: Instant,
}

/// How long a clamped-low observation is honored after it's first seen.
/// Matches the dashboard poll-jitter grace window used elsewhere in this
/// spec (spec.md §4.10 "terminated within the last 30s").
const CLAMP_TTL: std::time::Duration = std::time::Duration::from_secs(30);

/// Caches the highest `(completedJobs, failedJobs)` observed per Run so a
/// backend restart that causes a transient recount never shows a dashboard
/// poller numbers lower than it already saw (spec.md §9).
#[derive(Default)]
pub struct DashboardCache {
    seen: DashMap<String, ObservedCounters>,
}

impl DashboardCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters to report for `run_id`: the larger of what was
    /// just observed and whatever was cached, recording the result.
    pub fn clamp(&self, run_id: &str, completed_jobs: u32, failed_jobs: u32) -> (u32, u32) {
        let now = Instant::now();
        let mut entry = self.seen.entry(run_id.to_string()).or_insert(ObservedCounters {
            completed_jobs,
            failed_jobs,
            observed_at: now,
        });

        let stale = now.duration_since(entry.observed_at) > CLAMP_TTL;
        if stale || completed_jobs > entry.completed_jobs || failed_jobs > entry.failed_jobs {
            entry.completed_jobs = entry.completed_jobs.max(completed_jobs);
            entry.failed_jobs = entry.failed_jobs.max(failed_jobs);
            entry.observed_at = now;
        }
        (entry.completed_jobs, entry.failed_jobs)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<dyn HeartbeatRegistry>,
    pub run_store: Arc<dyn RunStore>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
    pub incident_store: Arc<dyn IncidentStore>,
    pub incident_detector: Arc<IncidentDetector>,
    pub audit: Arc<dyn AuditStore>,
    /// Queues this control plane knows about — closes the set the same way
    /// `dispatch_core::handler::HandlerRegistry` closes job types (spec.md
    /// §9 "dynamic dispatch on job type"); an unknown name 404s.
    pub queue_names: Arc<Vec<String>>,
    /// Shared secret compared against the `Authorization: Bearer` header;
    /// the session/auth subsystem proper is out of scope (spec.md §1), so
    /// this is the minimal stand-in the control plane needs for its own
    /// 401/403 contract.
    pub admin_api_key: Arc<str>,
    pub dashboard_cache: Arc<DashboardCache>,
}

impl AppState {
    pub fn known_queue(&self, name: &str) -> bool {
        self.queue_names.iter().any(|q| q == name)
    }
}
