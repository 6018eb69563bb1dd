//! Maps `Job` to and from the flat string fields stored in its Redis hash.
//!
//! Scalar fields only — `payload` and `return_value` are JSON-encoded
//! strings, matching the teacher's own `RedisJobField`/`HMGET` convention
//! (`other_examples/b9ccacef_dimfeld-ergo__queues-lib.rs.rs`) rather than
//! storing one JSON blob per job, so Lua scripts can flip `status` or bump
//! `attempts_made` without touching an opaque payload.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use dispatch_core::{CoreError, CoreResult, ErrorCode, Job, JobStatus};

use crate::error::map_serde_err;

/// The sort score used to order `waiting`/`delayed`: lower pops first, so
/// lower priority number and earlier `created_at` both sort earlier.
pub fn sort_score(priority: i32, created_at_ms: i64) -> f64 {
    (priority as f64) * 1e13 + (created_at_ms as f64)
}

fn opt_string(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn some_if_nonempty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn to_hash_fields(job: &Job, sort_score: f64) -> Vec<(&'static str, String)> {
    vec![
        ("id", job.id.clone()),
        ("queue", job.queue.clone()),
        ("job_type", job.job_type.clone()),
        ("payload", job.payload.to_string()),
        ("user_id", opt_string(&job.user_id)),
        ("schedule_run_id", opt_string(&job.schedule_run_id)),
        (
            "sequence_number",
            job.sequence_number.map(|n| n.to_string()).unwrap_or_default(),
        ),
        ("attempts_made", job.attempts_made.to_string()),
        ("max_attempts", job.max_attempts.to_string()),
        ("priority", job.priority.to_string()),
        ("status", status_to_str(job.status).to_string()),
        (
            "error_code",
            job.error_code.map(|c| error_code_to_str(c).to_string()).unwrap_or_default(),
        ),
        ("error_message", opt_string(&job.error_message)),
        ("created_at", job.created_at.timestamp_millis().to_string()),
        (
            "started_at",
            job.started_at.map(|t| t.timestamp_millis().to_string()).unwrap_or_default(),
        ),
        (
            "finished_at",
            job.finished_at.map(|t| t.timestamp_millis().to_string()).unwrap_or_default(),
        ),
        (
            "return_value",
            job.return_value.as_ref().map(|v| v.to_string()).unwrap_or_default(),
        ),
        ("owner_worker_id", opt_string(&job.owner_worker_id)),
        ("sort_score", sort_score.to_string()),
        ("cancel_requested", if job.cancel_requested { "1".to_string() } else { String::new() }),
    ]
}

pub fn from_hash(fields: HashMap<String, String>) -> CoreResult<Job> {
    let get = |k: &str| fields.get(k).cloned().unwrap_or_default();

    let payload_raw = get("payload");
    let payload = if payload_raw.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&payload_raw).map_err(map_serde_err)?
    };

    let return_value_raw = get("return_value");
    let return_value = some_if_nonempty(return_value_raw)
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(map_serde_err)?;

    Ok(Job {
        id: get("id"),
        queue: get("queue"),
        job_type: get("job_type"),
        payload,
        user_id: some_if_nonempty(get("user_id")),
        schedule_run_id: some_if_nonempty(get("schedule_run_id")),
        sequence_number: some_if_nonempty(get("sequence_number")).and_then(|s| s.parse().ok()),
        attempts_made: get("attempts_made").parse().unwrap_or(0),
        max_attempts: get("max_attempts").parse().unwrap_or(0),
        priority: get("priority").parse().unwrap_or(0),
        status: str_to_status(&get("status"))?,
        error_code: some_if_nonempty(get("error_code"))
            .map(|s| str_to_error_code(&s))
            .transpose()?,
        error_message: some_if_nonempty(get("error_message")),
        created_at: millis_to_ts(&get("created_at")).unwrap_or_else(Utc::now),
        started_at: some_if_nonempty(get("started_at")).and_then(|s| millis_to_ts(&s)),
        finished_at: some_if_nonempty(get("finished_at")).and_then(|s| millis_to_ts(&s)),
        return_value,
        owner_worker_id: some_if_nonempty(get("owner_worker_id")),
        cancel_requested: get("cancel_requested") == "1",
    })
}

fn millis_to_ts(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "QUEUED",
        JobStatus::Active => "ACTIVE",
        JobStatus::Delayed => "DELAYED",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
        JobStatus::Cancelled => "CANCELLED",
    }
}

fn str_to_status(s: &str) -> CoreResult<JobStatus> {
    Ok(match s {
        "QUEUED" => JobStatus::Queued,
        "ACTIVE" => JobStatus::Active,
        "DELAYED" => JobStatus::Delayed,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed,
        "CANCELLED" => JobStatus::Cancelled,
        other => return Err(CoreError::Other(anyhow::anyhow!("corrupt job status in redis: {other}"))),
    })
}

pub(crate) fn error_code_to_str(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::LoginRequired => "LOGIN_REQUIRED",
        ErrorCode::PermissionDenied => "PERMISSION_DENIED",
        ErrorCode::EditorLoadFail => "EDITOR_LOAD_FAIL",
        ErrorCode::ImageUploadFail => "IMAGE_UPLOAD_FAIL",
        ErrorCode::NetworkError => "NETWORK_ERROR",
        ErrorCode::CafeNotFound => "CAFE_NOT_FOUND",
        ErrorCode::RateLimited => "RATE_LIMITED",
        ErrorCode::ChallengeRequired => "CHALLENGE_REQUIRED",
        ErrorCode::AuthExpired => "AUTH_EXPIRED",
        ErrorCode::Timeout => "TIMEOUT",
        ErrorCode::Unknown => "UNKNOWN",
    }
}

fn str_to_error_code(s: &str) -> CoreResult<ErrorCode> {
    Ok(match s {
        "LOGIN_REQUIRED" => ErrorCode::LoginRequired,
        "PERMISSION_DENIED" => ErrorCode::PermissionDenied,
        "EDITOR_LOAD_FAIL" => ErrorCode::EditorLoadFail,
        "IMAGE_UPLOAD_FAIL" => ErrorCode::ImageUploadFail,
        "NETWORK_ERROR" => ErrorCode::NetworkError,
        "CAFE_NOT_FOUND" => ErrorCode::CafeNotFound,
        "RATE_LIMITED" => ErrorCode::RateLimited,
        "CHALLENGE_REQUIRED" => ErrorCode::ChallengeRequired,
        "AUTH_EXPIRED" => ErrorCode::AuthExpired,
        "TIMEOUT" => ErrorCode::Timeout,
        "UNKNOWN" => ErrorCode::Unknown,
        other => return Err(CoreError::Other(anyhow::anyhow!("corrupt error code in redis: {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_hash_fields() {
        let mut job = Job::new("cafe-jobs", "CREATE_POST", json!({"board": "free"}));
        job.user_id = Some("user-1".into());
        job.priority = -5;

        let fields = to_hash_fields(&job, sort_score(job.priority, job.created_at.timestamp_millis()));
        let map: HashMap<String, String> = fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let restored = from_hash(map).unwrap();

        assert_eq!(restored.id, job.id);
        assert_eq!(restored.job_type, "CREATE_POST");
        assert_eq!(restored.user_id.as_deref(), Some("user-1"));
        assert_eq!(restored.payload, json!({"board": "free"}));
        assert_eq!(restored.priority, -5);
    }
}
