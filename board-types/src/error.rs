//! Error types for meshboard data.

use thiserror::Error;

/// Errors raised while constructing or decoding meshboard data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Wallet address is empty or contains whitespace
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// Content identifier has the wrong shape
    #[error("invalid content identifier: {0:?}")]
    InvalidContentId(String),

    /// A replicated document failed validation
    #[error("malformed document {id}: {reason}")]
    Malformed {
        /// Id of the offending document, if it had one.
        id: String,
        /// Why it was rejected.
        reason: String,
    },
}
