//! # Error Types
//!
//! Errors raised while encoding or decoding message payloads.

use thiserror::Error;

/// Errors that can occur while moving a typed value in or out of a message body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The body carries a different type than the one requested.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The value could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The bytes do not decode into the requested type.
    #[error("Decode error: {0}")]
    Decode(String),
}
