//! Error types for decoder configuration and input validation

use thiserror::Error;

/// Errors that can occur while feeding or configuring a decoder
///
/// Running out of signal is not an error: it shows up as `None` from the
/// reading accessors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecoderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl DecoderError {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the core crate
pub type Result<T> = std::result::Result<T, DecoderError>;
