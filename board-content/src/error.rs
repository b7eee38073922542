//! Error types for board-content.

use thiserror::Error;

/// Errors that can occur during content operations.
#[derive(Error, Debug)]
pub enum ContentError {
    /// The content node is unreachable or refused the request.
    /// Not retried here; the caller decides.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Content not found in the store.
    #[error("content not found: {cid}")]
    NotFound {
        /// Identifier of the missing content.
        cid: String,
    },

    /// The node answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON encoding or decoding of a document failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ContentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ContentError::InvalidResponse(e.to_string())
        } else {
            ContentError::StorageFailure(e.to_string())
        }
    }
}
