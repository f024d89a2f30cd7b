//! Typed errors and translation into the structured wire error.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no {kind} with id {id}")]
    NotFound { kind: String, id: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("storage: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        StoreError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

/// Error shape handed to callers. Low-level failures are never passed
/// through verbatim; every failed operation yields exactly one of these.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub status: String,
    pub code: String,
    pub title: String,
    pub detail: String,
}

impl From<StoreError> for StructuredError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { ref kind, ref id } => StructuredError {
                status: "404".into(),
                code: "ENOTFOUND".into(),
                title: "Requested resource does not exist".into(),
                detail: format!("There is no {} with id {}", kind, id),
            },
            other => StructuredError {
                status: "500".into(),
                code: "EUNKNOWN".into(),
                title: "An unknown error has occurred".into(),
                detail: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.code, self.detail)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_translates_to_404() {
        let e: StructuredError = StoreError::not_found("articles", "abc-1").into();
        assert_eq!(e.status, "404");
        assert_eq!(e.code, "ENOTFOUND");
        assert_eq!(e.title, "Requested resource does not exist");
        assert_eq!(e.detail, "There is no articles with id abc-1");
    }

    #[test]
    fn storage_failure_translates_to_unknown() {
        let e: StructuredError = StoreError::Storage("connection reset".into()).into();
        assert_eq!(e.status, "500");
        assert_eq!(e.code, "EUNKNOWN");
        assert_eq!(e.title, "An unknown error has occurred");
        assert!(e.detail.contains("connection reset"));
    }
}
