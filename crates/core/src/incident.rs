//! `Incident` entity and the pure detection rules that derive candidate
//! incidents from a window of snapshots (spec.md §3/§4.7).
//!
//! These functions take no IO — "machines are pure" is the teacher's own
//! design principle (`seesaw`'s `Machine` trait doc comment), applied here
//! to anomaly detection instead of event-sourced decisions. The orchestration
//! (look up the open Incident, insert/update, auto-resolve after 5 minutes)
//! lives in `dispatch-scheduler`, which owns the `IncidentStore` IO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::QueueStatsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    QueueBacklog,
    HighFailureRate,
    WorkerDown,
    SlowProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub queue_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub recommended_action: Option<String>,
    pub affected_jobs: u64,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    /// Bumped every time a detection rule re-observes this Incident still
    /// firing; the auto-resolve clock (spec.md §4.7) runs off of this, not
    /// `started_at`, so a long-lived incident doesn't resolve early just
    /// because it opened more than `AUTO_RESOLVE_AFTER_SECS` ago.
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// A detection rule firing, before it is matched against any existing open
/// Incident for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCondition {
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub affected_jobs: u64,
    pub title: String,
    pub description: String,
    pub recommended_action: String,
}

/// QUEUE_BACKLOG: `waiting > 200` sustained for >= 3 consecutive snapshots
/// -> HIGH; `> 100` for >= 5 -> MEDIUM. `snapshots` must be the most recent
/// N snapshots for one queue, oldest first.
pub fn detect_queue_backlog(snapshots: &[QueueStatsSnapshot]) -> Option<DetectedCondition> {
    let tail_high = snapshots.iter().rev().take(3);
    let sustained_high = tail_high.clone().count() == 3 && tail_high.clone().all(|s| s.waiting > 200);
    if sustained_high {
        let affected = snapshots.last()?.waiting;
        return Some(DetectedCondition {
            incident_type: IncidentType::QueueBacklog,
            severity: Severity::High,
            affected_jobs: affected,
            title: "Queue backlog growing".to_string(),
            description: format!("{affected} jobs waiting for 3+ consecutive snapshots"),
            recommended_action: "Scale up worker pool or investigate stuck handlers".to_string(),
        });
    }

    let tail_medium = snapshots.iter().rev().take(5);
    let sustained_medium =
        tail_medium.clone().count() == 5 && tail_medium.clone().all(|s| s.waiting > 100);
    if sustained_medium {
        let affected = snapshots.last()?.waiting;
        return Some(DetectedCondition {
            incident_type: IncidentType::QueueBacklog,
            severity: Severity::Medium,
            affected_jobs: affected,
            title: "Queue backlog building".to_string(),
            description: format!("{affected} jobs waiting for 5+ consecutive snapshots"),
            recommended_action: "Monitor; scale up if the trend continues".to_string(),
        });
    }

    None
}

/// HIGH_FAILURE_RATE: over the snapshots passed (expected to span the last
/// 30 minutes), `failed / (completed + failed) >= 0.3` with
/// `completed + failed >= 20` -> HIGH; `>= 0.5` -> CRITICAL.
///
/// `completed`/`failed` on `QueueStatsSnapshot` are cumulative counters, so
/// the rate is computed over the delta between the first and last sample
/// in the window, not their absolute values.
pub fn detect_high_failure_rate(window: &[QueueStatsSnapshot]) -> Option<DetectedCondition> {
    let first = window.first()?;
    let last = window.last()?;
    let completed_delta = last.completed.saturating_sub(first.completed);
    let failed_delta = last.failed.saturating_sub(first.failed);
    let total = completed_delta + failed_delta;
    if total < 20 {
        return None;
    }
    let rate = failed_delta as f64 / total as f64;
    if rate >= 0.5 {
        Some(DetectedCondition {
            incident_type: IncidentType::HighFailureRate,
            severity: Severity::Critical,
            affected_jobs: failed_delta,
            title: "Critical job failure rate".to_string(),
            description: format!("{:.0}% of jobs failed over the last 30 minutes", rate * 100.0),
            recommended_action: "Pause the queue and investigate the handler".to_string(),
        })
    } else if rate >= 0.3 {
        Some(DetectedCondition {
            incident_type: IncidentType::HighFailureRate,
            severity: Severity::High,
            affected_jobs: failed_delta,
            title: "High job failure rate".to_string(),
            description: format!("{:.0}% of jobs failed over the last 30 minutes", rate * 100.0),
            recommended_action: "Investigate recent handler errors".to_string(),
        })
    } else {
        None
    }
}

/// WORKER_DOWN: `onlineWorkers = 0` for >= 2 consecutive snapshots while
/// `waiting > 0` -> CRITICAL.
pub fn detect_worker_down(snapshots: &[QueueStatsSnapshot]) -> Option<DetectedCondition> {
    let tail = snapshots.iter().rev().take(2);
    let sustained = tail.clone().count() == 2 && tail.clone().all(|s| s.online_workers == 0);
    let waiting = snapshots.last()?.waiting;
    if sustained && waiting > 0 {
        Some(DetectedCondition {
            incident_type: IncidentType::WorkerDown,
            severity: Severity::Critical,
            affected_jobs: waiting,
            title: "No workers online".to_string(),
            description: format!("{waiting} jobs waiting with zero online workers"),
            recommended_action: "Check worker process health and restart the fleet".to_string(),
        })
    } else {
        None
    }
}

/// How long a condition must stop firing before the open Incident
/// auto-resolves (spec.md §4.7).
pub const AUTO_RESOLVE_AFTER_SECS: i64 = 5 * 60;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(waiting: u64, online_workers: u64, completed: u64, failed: u64, minute: i64) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            queue_name: "cafe-jobs".into(),
            waiting,
            active: 0,
            delayed: 0,
            completed,
            failed,
            paused: false,
            jobs_per_min: Some(0),
            clamped: false,
            online_workers,
            timestamp: Utc::now() + Duration::minutes(minute),
        }
    }

    #[test]
    fn s6_backlog_high_after_three_sustained_snapshots() {
        let snaps = vec![snap(250, 2, 0, 0, 0), snap(250, 2, 0, 0, 1), snap(250, 2, 0, 0, 2)];
        let detected = detect_queue_backlog(&snaps).expect("should detect");
        assert_eq!(detected.severity, Severity::High);
        assert_eq!(detected.affected_jobs, 250);
    }

    #[test]
    fn backlog_medium_needs_five_sustained_snapshots() {
        let snaps: Vec<_> = (0..5).map(|i| snap(150, 2, 0, 0, i)).collect();
        let detected = detect_queue_backlog(&snaps).expect("should detect");
        assert_eq!(detected.severity, Severity::Medium);
    }

    #[test]
    fn backlog_not_detected_below_threshold() {
        let snaps: Vec<_> = (0..5).map(|i| snap(50, 2, 0, 0, i)).collect();
        assert!(detect_queue_backlog(&snaps).is_none());
    }

    #[test]
    fn high_failure_rate_needs_minimum_volume() {
        let snaps = vec![snap(0, 2, 0, 0, 0), snap(0, 2, 5, 5, 30)];
        // Only 10 total outcomes, below the 20 minimum.
        assert!(detect_high_failure_rate(&snaps).is_none());
    }

    #[test]
    fn high_failure_rate_detects_high_and_critical() {
        let snaps = vec![snap(0, 2, 0, 0, 0), snap(0, 2, 14, 6, 30)];
        let detected = detect_high_failure_rate(&snaps).expect("0.3 rate should fire");
        assert_eq!(detected.severity, Severity::High);

        let snaps = vec![snap(0, 2, 0, 0, 0), snap(0, 2, 10, 10, 30)];
        let detected = detect_high_failure_rate(&snaps).expect("0.5 rate should fire");
        assert_eq!(detected.severity, Severity::Critical);
    }

    #[test]
    fn worker_down_requires_waiting_jobs() {
        let snaps = vec![snap(0, 0, 0, 0, 0), snap(0, 0, 0, 0, 1)];
        assert!(detect_worker_down(&snaps).is_none());

        let snaps = vec![snap(5, 0, 0, 0, 0), snap(5, 0, 0, 0, 1)];
        let detected = detect_worker_down(&snaps).expect("should detect");
        assert_eq!(detected.severity, Severity::Critical);
    }
}
