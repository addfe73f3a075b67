//! Maps backend failures into the engine error taxonomy.
//!
//! This is the only place that looks at driver specific details (SQLSTATE
//! codes, SQLite result codes). Everything above the row primitives works
//! with [`EngineError`] and [`ErrorKind`](crate::ErrorKind) only.

use sea_orm::{DbErr, RuntimeErr, SqlErr};

use crate::EngineError;

/// SQLite busy/locked result codes, including the extended variants.
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

/// PostgreSQL serialization failure and deadlock victim.
const POSTGRES_TRANSIENT_CODES: &[&str] = &["40001", "40P01"];

/// Classify a backend error.
pub(crate) fn classify(err: DbErr) -> EngineError {
    if let DbErr::RecordNotFound(what) = &err {
        return EngineError::KeyNotFound(what.clone());
    }
    if matches!(err, DbErr::RecordNotUpdated) {
        return EngineError::KeyNotFound("record not exists".to_string());
    }
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return EngineError::ExistingKey(detail);
    }
    if is_transient(&err) {
        return EngineError::Transient(err);
    }
    EngineError::Database(err)
}

/// `true` for failures that go away when the operation is retried.
pub(crate) fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        _ => database_code(err).is_some_and(|code| {
            SQLITE_TRANSIENT_CODES.contains(&code.as_str())
                || POSTGRES_TRANSIENT_CODES.contains(&code.as_str())
                || code.starts_with("08")
        }),
    }
}

fn database_code(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Query(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::ConnAcquireErr;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn missing_records_are_not_found() {
        let err = classify(DbErr::RecordNotFound("user not exists".to_string()));
        assert_eq!(err, EngineError::KeyNotFound("user not exists".to_string()));

        assert_eq!(classify(DbErr::RecordNotUpdated).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn pool_timeouts_are_transient() {
        let err = classify(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn unknown_errors_are_internal() {
        let err = classify(DbErr::Custom("unexpected".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!is_transient(&DbErr::Custom("unexpected".to_string())));
    }
}
