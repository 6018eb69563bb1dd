//! Text encodings for the enum columns — bound as plain strings the same
//! way the teacher's `mark_failed` binds `error_kind` (no `sqlx::Type`
//! derive; Postgres infers the enum type from the column at bind time).

use dispatch_core::{ActorType, IncidentStatus, IncidentType, RunStatus, Severity};

pub(crate) fn run_status_to_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Pending => "PENDING",
        RunStatus::Running => "RUNNING",
        RunStatus::Completed => "COMPLETED",
        RunStatus::Failed => "FAILED",
        RunStatus::Cancelled => "CANCELLED",
    }
}

pub(crate) fn str_to_run_status(s: &str) -> RunStatus {
    match s {
        "PENDING" => RunStatus::Pending,
        "RUNNING" => RunStatus::Running,
        "COMPLETED" => RunStatus::Completed,
        "FAILED" => RunStatus::Failed,
        "CANCELLED" => RunStatus::Cancelled,
        other => panic!("corrupt run_status in postgres: {other}"),
    }
}

pub(crate) fn incident_type_to_str(t: IncidentType) -> &'static str {
    match t {
        IncidentType::QueueBacklog => "QUEUE_BACKLOG",
        IncidentType::HighFailureRate => "HIGH_FAILURE_RATE",
        IncidentType::WorkerDown => "WORKER_DOWN",
        IncidentType::SlowProcessing => "SLOW_PROCESSING",
    }
}

pub(crate) fn str_to_incident_type(s: &str) -> IncidentType {
    match s {
        "QUEUE_BACKLOG" => IncidentType::QueueBacklog,
        "HIGH_FAILURE_RATE" => IncidentType::HighFailureRate,
        "WORKER_DOWN" => IncidentType::WorkerDown,
        "SLOW_PROCESSING" => IncidentType::SlowProcessing,
        other => panic!("corrupt incident_type in postgres: {other}"),
    }
}

pub(crate) fn severity_to_str(s: Severity) -> &'static str {
    match s {
        Severity::Low => "LOW",
        Severity::Medium => "MEDIUM",
        Severity::High => "HIGH",
        Severity::Critical => "CRITICAL",
    }
}

pub(crate) fn str_to_severity(s: &str) -> Severity {
    match s {
        "LOW" => Severity::Low,
        "MEDIUM" => Severity::Medium,
        "HIGH" => Severity::High,
        "CRITICAL" => Severity::Critical,
        other => panic!("corrupt severity in postgres: {other}"),
    }
}

pub(crate) fn incident_status_to_str(s: IncidentStatus) -> &'static str {
    match s {
        IncidentStatus::Active => "ACTIVE",
        IncidentStatus::Acknowledged => "ACKNOWLEDGED",
        IncidentStatus::Resolved => "RESOLVED",
    }
}

pub(crate) fn str_to_incident_status(s: &str) -> IncidentStatus {
    match s {
        "ACTIVE" => IncidentStatus::Active,
        "ACKNOWLEDGED" => IncidentStatus::Acknowledged,
        "RESOLVED" => IncidentStatus::Resolved,
        other => panic!("corrupt incident_status in postgres: {other}"),
    }
}

pub(crate) fn actor_type_to_str(t: ActorType) -> &'static str {
    match t {
        ActorType::Admin => "ADMIN",
        ActorType::User => "USER",
        ActorType::System => "SYSTEM",
    }
}

pub(crate) fn str_to_actor_type(s: &str) -> ActorType {
    match s {
        "ADMIN" => ActorType::Admin,
        "USER" => ActorType::User,
        "SYSTEM" => ActorType::System,
        other => panic!("corrupt actor_type in postgres: {other}"),
    }
}
