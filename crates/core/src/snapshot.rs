//! `QueueStatsSnapshot` — immutable time-series row (spec.md §3/§4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsSnapshot {
    pub queue_name: String,
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: bool,
    /// `None` for the very first sample of a queue (no prior to diff
    /// against).
    pub jobs_per_min: Option<u64>,
    /// Set when `jobs_per_min` was clamped to zero because the prior
    /// `completed` count was higher than the current one (e.g. a `clean`
    /// ran between ticks) — spec.md §9 first open question.
    pub clamped: bool,
    pub online_workers: u64,
    pub timestamp: DateTime<Utc>,
}

/// `jobsPerMin = max(0, completed_now - completed_prev)` (spec.md §4.6
/// step 3), with the clamp recorded rather than silently swallowed.
pub fn compute_jobs_per_min(completed_now: u64, completed_prev: Option<u64>) -> (Option<u64>, bool) {
    match completed_prev {
        None => (None, false),
        Some(prev) if completed_now >= prev => (Some(completed_now - prev), false),
        Some(_) => (Some(0), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_has_no_rate() {
        assert_eq!(compute_jobs_per_min(10, None), (None, false));
    }

    #[test]
    fn normal_increase() {
        assert_eq!(compute_jobs_per_min(15, Some(10)), (Some(5), false));
    }

    #[test]
    fn decrease_clamps_to_zero_and_flags() {
        assert_eq!(compute_jobs_per_min(3, Some(10)), (Some(0), true));
    }
}
