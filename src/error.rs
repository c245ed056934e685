//! Error types shared by the library.

use thiserror::Error;

use crate::models::EntityId;

pub type Result<T> = std::result::Result<T, SiftError>;

/// Fatal errors. Data-quality anomalies are not errors; they are
/// collected as [`crate::region::Diagnostic`] records instead.
#[derive(Debug, Error)]
pub enum SiftError {
    /// Malformed input structure or a compression magic mismatch.
    #[error("malformed input at byte {position}: {message}")]
    Format { position: u64, message: String },

    /// A relation reaches itself through its members.
    #[error("cyclic relation reference through {0}")]
    CyclicReference(EntityId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiftError {
    pub fn format(position: u64, message: impl Into<String>) -> Self {
        SiftError::Format {
            position,
            message: message.into(),
        }
    }
}
