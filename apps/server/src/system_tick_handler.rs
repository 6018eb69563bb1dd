//! Adapts the Snapshot Collector + Incident Detector ticks into a
//! `JobHandler` so `stats-snapshot-collector` flows through the same
//! `JobQueue`/Worker Pool machinery as every other job, per the Queue's
//! repeatable-job single-instance contract (spec.md §4.1/§4.6) rather
//! than a separate cron loop.

use async_trait::async_trait;

use dispatch_core::{HandlerContext, HandlerOutcome, Job, JobHandler};
use dispatch_scheduler::{IncidentDetector, SnapshotCollector};

pub struct SystemTickHandler {
    snapshot_collector: std::sync::Arc<SnapshotCollector>,
    incident_detector: std::sync::Arc<IncidentDetector>,
}

impl SystemTickHandler {
    pub fn new(
        snapshot_collector: std::sync::Arc<SnapshotCollector>,
        incident_detector: std::sync::Arc<IncidentDetector>,
    ) -> Self {
        Self { snapshot_collector, incident_detector }
    }
}

#[async_trait]
impl JobHandler for SystemTickHandler {
    async fn handle(&self, _job: &Job, _ctx: &HandlerContext) -> HandlerOutcome {
        self.snapshot_collector.tick().await;
        self.incident_detector.tick().await;
        HandlerOutcome::Ok { return_value: None }
    }

    // Single-instance by construction (the Queue enforces at-most-one-live
    // per repeatable `job_id`), but concurrency stays 1 regardless since a
    // second concurrent tick would double-count `jobsPerMin`.
    fn concurrency(&self) -> usize {
        1
    }

    fn timeout_ms(&self) -> i64 {
        30_000
    }
}
