//! Upload coordinator error types.

use thiserror::Error;

use vidgate_storage::StorageError;

use crate::session::SessionState;

/// Result type for coordinator operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors surfaced by the upload coordinator.
///
/// Everything except `Store` is a client error: the request was malformed
/// or inconsistent with recorded session state, and no store call was made.
/// `Store` carries a permanent store failure (or a transient one that
/// exhausted its retries); by the time it surfaces, the session has been
/// aborted and its record discarded.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("total parts must be at least 1")]
    InvalidTotalParts,

    #[error("part number {part_number} is outside 1..={total_parts}")]
    InvalidPartNumber { part_number: u32, total_parts: u32 },

    #[error("chunk payload is empty")]
    EmptyPayload,

    #[error("part {part_number} is {size} bytes; non-final parts must be at least {min} bytes")]
    PartTooSmall {
        part_number: u32,
        size: usize,
        min: usize,
    },

    #[error("a session id is required for parts after the first")]
    MissingSessionId,

    #[error("total parts {given} does not match {expected} recorded for session {session_id}")]
    InconsistentTotalParts {
        session_id: String,
        expected: u32,
        given: u32,
    },

    #[error("unknown upload session: {0}")]
    SessionNotFound(String),

    #[error("upload session {session_id} is {state} and no longer accepts chunks")]
    SessionClosed {
        session_id: String,
        state: SessionState,
    },

    #[error("object store error: {0}")]
    Store(#[from] StorageError),
}

impl UploadError {
    /// Whether the caller, not the store, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(UploadError::InvalidTotalParts.is_client_error());
        assert!(UploadError::SessionNotFound("sess-1".into()).is_client_error());
        assert!(UploadError::SessionClosed {
            session_id: "sess-1".into(),
            state: SessionState::Completed,
        }
        .is_client_error());
        assert!(!UploadError::Store(StorageError::Timeout("nope".into())).is_client_error());
    }
}
