//! Error types and result types for document access operations.
//!
//! Every fallible function in this crate returns [`DocumentStoreResult<T>`]. Errors stay
//! typed while they propagate through the services and are only flattened into a
//! response envelope at the public API boundary (see [`crate::envelope`]).

use bson::error::Error as BsonError;
use serde::Serialize;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while accessing documents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// The caller is not allowed to perform the requested access.
    #[error("Permission denied: {0}")]
    Permission(String),
    /// The requested document was not found.
    /// The first argument is the document kind, the second is the document name.
    #[error("{0} {1} not found")]
    DocumentNotFound(String, String),
    /// No document matched a lookup that required one.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The requested document kind is not registered with the metadata provider.
    #[error("Document kind not found: {0}")]
    KindNotFound(String),
    /// Caller input is structurally invalid or violates a document rule.
    #[error("Validation error: {0}")]
    Validation(String),
    /// The store rejected a write because it conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A structured payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// The error taxonomy callers discriminate failures by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    NotFound,
    Validation,
    Conflict,
    Decode,
    Backend,
}

impl DocumentStoreError {
    /// Returns the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentStoreError::Permission(_) => ErrorKind::Permission,
            DocumentStoreError::DocumentNotFound(..)
            | DocumentStoreError::NotFound(_)
            | DocumentStoreError::KindNotFound(_) => ErrorKind::NotFound,
            DocumentStoreError::Validation(_) => ErrorKind::Validation,
            DocumentStoreError::Conflict(_) => ErrorKind::Conflict,
            DocumentStoreError::Decode(_) => ErrorKind::Decode,
            DocumentStoreError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Shorthand for a [`DocumentStoreError::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        DocumentStoreError::Validation(message.into())
    }

    /// Shorthand for a [`DocumentStoreError::DocumentNotFound`] error.
    pub fn document_not_found(kind: &str, name: &str) -> Self {
        DocumentStoreError::DocumentNotFound(kind.to_string(), name.to_string())
    }
}

/// A specialized `Result` type for document access operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Decode(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_a_kind() {
        assert_eq!(DocumentStoreError::document_not_found("Task", "T1").kind(), ErrorKind::NotFound);
        assert_eq!(DocumentStoreError::KindNotFound("Task".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            DocumentStoreError::document_not_found("Task", "T1").to_string(),
            "Task T1 not found"
        );
    }

    #[test]
    fn json_errors_become_decode_errors() {
        let err: DocumentStoreError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}
