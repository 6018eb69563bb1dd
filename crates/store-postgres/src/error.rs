//! Maps `sqlx::Error` onto the stable `CoreError` taxonomy.

use dispatch_core::CoreError;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
        other => CoreError::QueueUnavailable(other.to_string()),
    }
}
