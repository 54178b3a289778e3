//! The caller-facing response shape of every public operation.
//!
//! Successes carry the raw result payload. Failures are flattened into
//! `{data: null, response_code, exception, traceback}`; the typed [`ErrorKind`] stays
//! available on the Rust side but is not part of the wire shape.

use serde::Serialize;
use tracing::warn;

use crate::{
    config::ApiConfig,
    error::{DocumentStoreError, DocumentStoreResult, ErrorKind},
};

/// Outcome of a public operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response<T> {
    Success(T),
    Failure(ErrorEnvelope),
}

/// A flattened failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    /// Always `null`.
    pub data: Option<serde_json::Value>,
    pub response_code: u16,
    pub exception: String,
    pub traceback: Option<String>,
    #[serde(skip)]
    pub kind: ErrorKind,
}

impl ErrorEnvelope {
    pub fn from_error(err: &DocumentStoreError, config: &ApiConfig) -> Self {
        let kind = err.kind();

        Self {
            data: None,
            response_code: response_code(kind, config.distinct_response_codes),
            exception: err.to_string(),
            traceback: config
                .include_traceback
                .then(|| format!("{err:?}")),
            kind,
        }
    }
}

impl<T> Response<T> {
    /// Wraps an operation result, logging failures.
    pub fn from_result(result: DocumentStoreResult<T>, config: &ApiConfig) -> Self {
        match result {
            Ok(value) => Response::Success(value),
            Err(err) => {
                let envelope = ErrorEnvelope::from_error(&err, config);
                warn!(
                    kind = ?envelope.kind,
                    response_code = envelope.response_code,
                    error = %err,
                    "operation failed"
                );
                Response::Failure(envelope)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Response::Success(value) => Some(value),
            Response::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorEnvelope> {
        match self {
            Response::Success(_) => None,
            Response::Failure(envelope) => Some(envelope),
        }
    }

    pub fn into_result(self) -> Result<T, ErrorEnvelope> {
        match self {
            Response::Success(value) => Ok(value),
            Response::Failure(envelope) => Err(envelope),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        match self {
            Response::Success(value) => Response::Success(f(value)),
            Response::Failure(envelope) => Response::Failure(envelope),
        }
    }
}

fn response_code(kind: ErrorKind, distinct: bool) -> u16 {
    if !distinct {
        return 500;
    }

    match kind {
        ErrorKind::Permission => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::Validation => 417,
        ErrorKind::Conflict => 409,
        ErrorKind::Decode => 400,
        ErrorKind::Backend => 500,
    }
}
