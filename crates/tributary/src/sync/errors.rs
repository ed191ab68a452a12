use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by [`SyncManager`](super::SyncManager) operations.
///
/// Sync runs themselves never fail; these cover lookups and lifecycle
/// changes requested by callers.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(StoreError),

    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Unknown source: {source_id}")]
    UnknownSource { source_id: String },

    #[error("Source '{source_id}' has no handler '{handler_id}'")]
    UnknownHandler {
        source_id: String,
        handler_id: String,
    },

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl SyncError {
    pub fn connection_not_found(id: &str) -> Self {
        Self::ConnectionNotFound { id: id.to_string() }
    }

    pub fn unknown_source(source_id: &str) -> Self {
        Self::UnknownSource {
            source_id: source_id.to_string(),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConnectionNotFound(id) => Self::ConnectionNotFound { id },
            other => Self::Store(other),
        }
    }
}

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, SyncError>;
