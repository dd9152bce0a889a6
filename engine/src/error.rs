//! Error types for the Tally engine.

use thiserror::Error;

/// All possible errors from the Tally engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Persistence errors
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("failed to encode {what}: {reason}")]
    Encode { what: String, reason: String },

    // Validation errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    // Snapshot errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    pub(crate) fn encode(what: impl Into<String>, err: serde_json::Error) -> Self {
        Error::Encode {
            what: what.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
