//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Multipart operation failed: {0}")]
    MultipartFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Store unreachable: {0}")]
    Timeout(String),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Whether the failure is network-shaped and worth retrying.
    ///
    /// Permission, not-found, and validation failures are permanent; only
    /// timeouts and dispatch failures qualify for the coordinator's retry
    /// loop.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
