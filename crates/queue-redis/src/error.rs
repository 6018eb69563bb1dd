//! Maps `redis::RedisError` onto the stable `CoreError` taxonomy.

use dispatch_core::CoreError;

pub(crate) fn map_redis_err(err: redis::RedisError) -> CoreError {
    CoreError::QueueUnavailable(err.to_string())
}

pub(crate) fn map_serde_err(err: serde_json::Error) -> CoreError {
    CoreError::Validation(format!("job payload serialization: {err}"))
}
