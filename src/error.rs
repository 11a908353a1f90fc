//! Error types for the roster and its storage adapter.
//!
//! Only user-triggered imports surface errors to the caller. Storage errors
//! are logged by the layers that hit them and degrade to "no data".

use thiserror::Error;

/// Failure raised by a `RecordStore` write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage is unavailable")]
    Unavailable,

    #[error("write to `{key}` rejected: {reason}")]
    WriteRejected { key: String, reason: String },
}

/// Failure raised by roster operations that cannot degrade silently.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("unrecognized import format: {0}")]
    UnrecognizedImport(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid backup encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("no trainer at index {0}")]
    NoSuchTrainer(usize),
}
