//! Schedule Planner, Snapshot Collector and Incident Detector — the three
//! ticking orchestrators that sit on top of `dispatch-core`'s pure rules and
//! the relational stores in `dispatch-store-postgres` (spec.md §4.4, §4.6,
//! §4.7). `apps/server` owns the interval loops; this crate owns what each
//! tick does.

mod incident;
mod planner;
mod snapshot;

pub use incident::IncidentDetector;
pub use planner::{RunProgressTracker, SchedulePlanner};
pub use snapshot::SnapshotCollector;
