//! The module contains the errors the engine can return.
//!
//! Every error belongs to one [`ErrorKind`], which is what callers should
//! match on to decide how to react:
//!
//! - [`NotFound`] the user or entry does not exist, or belongs to another
//!   owner.
//! - [`Conflict`] a uniqueness rule was violated (username, email).
//! - [`Transient`] the datastore was unreachable or busy; retrying the whole
//!   operation is safe.
//! - [`Internal`] a programming or consistency failure, including a failed
//!   rollback.
//! - [`Invalid`] the input was rejected before touching the datastore.
//!
//!  [`NotFound`]: ErrorKind::NotFound
//!  [`Conflict`]: ErrorKind::Conflict
//!  [`Transient`]: ErrorKind::Transient
//!  [`Internal`]: ErrorKind::Internal
//!  [`Invalid`]: ErrorKind::Invalid
use sea_orm::DbErr;
use thiserror::Error;

use crate::classify;

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Transient,
    Internal,
    Invalid,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Internal => "internal",
            Self::Invalid => "invalid",
        }
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("transient storage failure: {0}")]
    Transient(#[source] DbErr),
    #[error("commit failed: {0}")]
    Commit(#[source] DbErr),
    #[error("rollback failed: {rollback} (original error: {cause})")]
    Rollback {
        cause: Box<EngineError>,
        rollback: DbErr,
    },
    #[error("engine built without a database connection")]
    MissingDatabase,
    #[error(transparent)]
    Database(DbErr),
}

impl EngineError {
    /// Return the taxonomy bucket of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::ExistingKey(_) => ErrorKind::Conflict,
            Self::InvalidName(_) | Self::InvalidAmount(_) => ErrorKind::Invalid,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Commit(err) if classify::is_transient(err) => ErrorKind::Transient,
            Self::Commit(_) | Self::Rollback { .. } | Self::MissingDatabase | Self::Database(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// `true` when the whole operation can be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<DbErr> for EngineError {
    fn from(err: DbErr) -> Self {
        classify::classify(err)
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::Transient(a), Self::Transient(b)) => a.to_string() == b.to_string(),
            (Self::Commit(a), Self::Commit(b)) => a.to_string() == b.to_string(),
            (
                Self::Rollback {
                    cause: a,
                    rollback: ra,
                },
                Self::Rollback {
                    cause: b,
                    rollback: rb,
                },
            ) => a == b && ra.to_string() == rb.to_string(),
            (Self::MissingDatabase, Self::MissingDatabase) => true,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            EngineError::KeyNotFound("user not exists".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::ExistingKey("alice".to_string()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::InvalidAmount("overflow".to_string()).kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            EngineError::Database(DbErr::Custom("boom".to_string())).kind(),
            ErrorKind::Internal
        );
        assert_eq!(EngineError::MissingDatabase.kind(), ErrorKind::Internal);
    }

    #[test]
    fn rollback_failure_keeps_both_errors() {
        let err = EngineError::Rollback {
            cause: Box::new(EngineError::KeyNotFound("entry not exists".to_string())),
            rollback: DbErr::Custom("connection reset".to_string()),
        };

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_retryable());
        let message = err.to_string();
        assert!(message.contains("connection reset"));
        assert!(message.contains("entry not exists"));
    }

    #[test]
    fn commit_failure_is_distinct_from_work_failure() {
        let commit = EngineError::Commit(DbErr::Custom("disk full".to_string()));
        let work = EngineError::Database(DbErr::Custom("disk full".to_string()));

        assert_ne!(commit, work);
        assert!(commit.to_string().starts_with("commit failed"));
    }

    #[test]
    fn db_errors_are_classified_on_conversion() {
        let err: EngineError = DbErr::RecordNotFound("users".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
