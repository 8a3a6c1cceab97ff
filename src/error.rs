//! Error types for the data layer
//!
//! `DataError` is what every façade operation returns. Remote failures are
//! wrapped in an `OperationError` that carries the operation name and a
//! timestamp so the UI can show (and later dismiss) the latest failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::Collection;
use crate::remote::RemoteError;

// == Failure Kind ==
/// Coarse classification of an operation failure, used for HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureKind {
    /// The targeted document does not exist
    NotFound,
    /// The caller passed something the store cannot apply
    InvalidInput,
    /// The remote store rejected or failed the call
    #[default]
    Remote,
}

// == Operation Error ==
/// A failed data operation.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{operation} failed: {message}")]
pub struct OperationError {
    /// Human-readable description
    pub message: String,
    /// Name of the façade operation (`create`, `update`, `batch`, ...)
    pub operation: String,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
    /// Optional payload describing the call that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip)]
    pub kind: FailureKind,
}

impl OperationError {
    /// Creates an error for a remote failure.
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            operation: operation.into(),
            timestamp: Utc::now(),
            details: None,
            kind: FailureKind::Remote,
        }
    }

    /// Creates an error for input the operation refuses to apply.
    pub fn invalid(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, message).with_kind(FailureKind::InvalidInput)
    }

    /// Creates an error for a missing document.
    pub fn not_found(operation: impl Into<String>, collection: Collection, id: &str) -> Self {
        Self::new(operation, format!("Document not found: {}/{}", collection, id))
            .with_kind(FailureKind::NotFound)
    }

    /// Wraps a remote store error.
    pub fn from_remote(operation: impl Into<String>, err: &RemoteError) -> Self {
        let kind = match err {
            RemoteError::NotFound { .. } => FailureKind::NotFound,
            RemoteError::InvalidOperation(_) => FailureKind::InvalidInput,
            _ => FailureKind::Remote,
        };
        Self::new(operation, err.to_string()).with_kind(kind)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = kind;
        self
    }
}

// == Validation Error ==
/// Field rules registered for a collection rejected the input.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Validation failed: {}", .messages.join(", "))]
pub struct ValidationError {
    pub collection: Collection,
    pub messages: Vec<String>,
}

// == Data Error Enum ==
/// Unified error type for the data layer and its HTTP surface.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    /// The service was used before `init()` or after `dispose()`
    #[error("Data service not initialized. Please wait for initialization to complete.")]
    NotInitialized,

    /// A remote call failed or its preconditions were not met
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// A registered validation schema rejected the input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Malformed request at the HTTP boundary
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resource missing at the HTTP boundary
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DataError {
    /// Converts the error into the record kept for UI display.
    ///
    /// Returns `None` for programmer errors that are never recorded.
    pub fn to_operation_error(&self, operation: &str) -> Option<OperationError> {
        match self {
            DataError::Operation(err) => Some(err.clone()),
            DataError::Validation(err) => Some(
                OperationError::invalid(operation, err.to_string())
                    .with_details(json!({ "collection": err.collection })),
            ),
            _ => None,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = match &self {
            DataError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            DataError::Operation(err) => match err.kind {
                FailureKind::NotFound => StatusCode::NOT_FOUND,
                FailureKind::InvalidInput => StatusCode::BAD_REQUEST,
                FailureKind::Remote => StatusCode::BAD_GATEWAY,
            },
            DataError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DataError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DataError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = match &self {
            DataError::Operation(err) => json!({
                "error": err.message,
                "operation": err.operation,
                "timestamp": err.timestamp,
            }),
            DataError::Validation(err) => json!({
                "error": self.to_string(),
                "messages": err.messages,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the data layer.
pub type Result<T> = std::result::Result<T, DataError>;
