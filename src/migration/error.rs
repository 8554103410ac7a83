//! Migration error types

use crate::executor::DbError;
use std::fmt;

/// Migration-specific error type
#[derive(Debug)]
pub enum MigrationError {
    /// Database error while reading or writing migration state
    Database(DbError),

    /// An applied migration no longer matches the statements compiled into the binary
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },

    /// A statement of the migration failed
    ExecutionFailed {
        version: i64,
        name: String,
        error: DbError,
    },

    /// The state table records a version this binary does not know
    MissingMigration { version: i64, name: String },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Database(err) => write!(f, "Database error: {}", err),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => {
                write!(
                    f,
                    "Checksum mismatch for migration {} ({}): stored={}, current={}",
                    version, name, stored, current
                )
            }
            MigrationError::ExecutionFailed {
                version,
                name,
                error,
            } => {
                write!(f, "Migration {} ({}) failed: {}", version, name, error)
            }
            MigrationError::MissingMigration { version, name } => {
                write!(
                    f,
                    "Applied migration {} ({}) is not known to this build",
                    version, name
                )
            }
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}
