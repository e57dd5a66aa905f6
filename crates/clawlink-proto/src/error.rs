//! Error types for the clawlink-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The JSON was well-formed but is not a recognizable frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decoding(err.to_string())
    }
}
