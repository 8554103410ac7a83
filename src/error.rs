//! Service error taxonomy.
//!
//! Every failure a caller can observe is one [`ApiError`]. Each variant has a
//! fixed HTTP status and a stable `error` tag in the JSON body; storage detail
//! is kept for the log and never written to the response.

use crate::executor::DbErrorKind;
use crate::store::StoreError;
use serde_json::json;
use std::fmt;

const STORAGE_MESSAGE: &str = "internal storage error";

#[derive(Debug)]
pub enum ApiError {
    /// Malformed or out-of-range input; no I/O was performed.
    Validation(String),
    /// A referenced entity is absent or inactive.
    NotFound(String),
    /// The source row holds less than the requested quantity.
    InsufficientStock { requested: i32, available: i32 },
    /// Lost a race for a row (lock timeout, serialization failure, deadlock)
    /// or hit a uniqueness rule; the caller may retry or correct the input.
    Conflict(String),
    /// The path exists but not for this verb.
    MethodNotAllowed(String),
    /// I/O or transaction failure. Holds the internal detail.
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::InsufficientStock { .. } => 400,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::Conflict(_) => 409,
            ApiError::Storage(_) => 500,
        }
    }

    /// Stable tag written as `error` in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::NotFound(_) => "NotFound",
            ApiError::InsufficientStock { .. } => "InsufficientStock",
            ApiError::Conflict(_) => "ConflictError",
            ApiError::MethodNotAllowed(_) => "MethodNotAllowed",
            ApiError::Storage(_) => "StorageError",
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Storage(_) => STORAGE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn body(&self) -> serde_json::Value {
        json!({ "error": self.kind(), "message": self.public_message() })
    }

    pub fn not_found(what: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{what} {id} not found"))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(s) => write!(f, "{s}"),
            ApiError::NotFound(s) => write!(f, "{s}"),
            ApiError::InsufficientStock {
                requested,
                available,
            } => write!(
                f,
                "insufficient stock: requested {requested}, available {available}"
            ),
            ApiError::Conflict(s) => write!(f, "{s}"),
            ApiError::MethodNotAllowed(s) => write!(f, "method not allowed: {s}"),
            ApiError::Storage(s) => write!(f, "storage error: {s}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Db(db) => match db.kind() {
                DbErrorKind::Conflict => {
                    ApiError::Conflict("concurrent update in progress, retry the request".into())
                }
                DbErrorKind::Duplicate => {
                    ApiError::Conflict("a record with the same unique key already exists".into())
                }
                DbErrorKind::MissingReference => {
                    ApiError::NotFound("referenced product or store not found".into())
                }
                DbErrorKind::CheckViolation => {
                    ApiError::Validation("value violates a data constraint".into())
                }
                DbErrorKind::Storage => ApiError::Storage(db.to_string()),
            },
            StoreError::Duplicate(s) => ApiError::Conflict(s),
            StoreError::MissingReference(s) => ApiError::NotFound(s),
            StoreError::Rejected(s) => ApiError::Validation(s),
            StoreError::Unavailable(s) => ApiError::Storage(s),
        }
    }
}
