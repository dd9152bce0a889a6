//! Error types for the sync layer.

use tally_engine::Table;

/// Sync layer error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] tally_engine::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote rejected {table} request ({status}): {message}")]
    Rejected {
        table: Table,
        status: u16,
        message: String,
    },

    /// Transient outage reported by a custom [`RemoteBackend`] that does not
    /// go through HTTP. [`RestRemote`] reports transport failures as `Http`.
    ///
    /// [`RemoteBackend`]: crate::RemoteBackend
    /// [`RestRemote`]: crate::RestRemote
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),

    #[error("Cannot sign in without a user id")]
    MissingIdentity,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
