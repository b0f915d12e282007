use thiserror::Error;

use super::is_unique_violation;

/// Domain-classified storage failure shared by every repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            RepositoryError::AlreadyExists(err.to_string())
        } else {
            RepositoryError::Sql(err)
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn unique_violation_classifies_as_already_exists() {
        let err = rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::ConstraintViolation,
                extended_code: ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            Some("UNIQUE constraint failed: wishes.user_id, wishes.source_id".into()),
        );
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::AlreadyExists(_)
        ));
    }

    #[test]
    fn foreign_key_violation_stays_internal() {
        let err = rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::ConstraintViolation,
                extended_code: ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            },
            None,
        );
        assert!(matches!(RepositoryError::from(err), RepositoryError::Sql(_)));
    }
}
