//! Error types for the project store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// SQLSTATE raised by PostgreSQL when a SERIALIZABLE transaction loses a conflict.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE raised when PostgreSQL breaks a deadlock by aborting one side.
pub const DEADLOCK_DETECTED: &str = "40P01";

/// Store errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, constraint violation, conflict, ...)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A serializable unit of work kept conflicting until the retry budget ran out.
    #[error("Serialization conflict persisted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Caller supplied a value the store refuses to persist
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// SQLSTATE of the underlying database error, if any.
    pub fn sqlstate(&self) -> Option<String> {
        let err = match self {
            DbError::Sqlx(err) => err,
            DbError::RetriesExhausted { source, .. } => source,
            DbError::InvalidInput(_) => return None,
        };
        match err {
            sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
            _ => None,
        }
    }

    /// True when the whole transaction may be re-run from the start.
    ///
    /// Only conflicts reported by the server's isolation machinery qualify.
    /// `RetriesExhausted` is terminal even though it wraps a conflict.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_retryable() {
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_serialization_failure());
        assert!(!DbError::invalid_input("bad").is_serialization_failure());
        let exhausted = DbError::RetriesExhausted {
            attempts: 3,
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(!exhausted.is_serialization_failure());
    }

    #[test]
    fn test_sqlstate_absent_for_non_database_errors() {
        assert_eq!(DbError::Sqlx(sqlx::Error::RowNotFound).sqlstate(), None);
        assert_eq!(DbError::invalid_input("x").sqlstate(), None);
    }
}
