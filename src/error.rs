//! Firestore error types
//!
//! RPC failures are carried as the `tonic::Status` the service returned, so the
//! code, message and details reach the caller unmodified. The remaining
//! variants cover failures detected on this side of the wire.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = FirestoreError> = std::result::Result<T, E>;

/// Errors returned by the Firestore client and its adapters
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// The service answered an RPC with a non-OK status
    #[error("Firestore RPC failed: {0}")]
    Status(#[from] tonic::Status),

    /// The gRPC channel could not be configured or connected
    #[error("Connection error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Document data could not be converted to or from Rust values
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The service returned data this client cannot interpret
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A field path does not resolve inside the document
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// The document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The client was closed before the call
    #[error("Client is closed")]
    ClientClosed,

    /// The bulk writer was ended before the write was enqueued
    #[error("Bulk writer is closed")]
    BulkWriterClosed,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FirestoreError {
    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// gRPC status code of an RPC failure, if this is one
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            Self::Status(status) => Some(status.code()),
            _ => None,
        }
    }

    /// Check if the failed call may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code(),
            Some(
                tonic::Code::Aborted
                    | tonic::Code::Unavailable
                    | tonic::Code::DeadlineExceeded
                    | tonic::Code::ResourceExhausted
            )
        )
    }

    /// Check if the service rejected the call because of a write conflict
    pub fn is_aborted(&self) -> bool {
        self.code() == Some(tonic::Code::Aborted)
    }
}
