//! Transport errors.

use lcg_core::{DecodeError, EncodeError};

/// Why a receive or send did not produce a result.
///
/// A peer close is not an error; see [`crate::Received::Closed`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Inbound accumulated bytes, or the outbound reported maximum, exceeded
    /// the message bound. The connection should be dropped.
    #[error("message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// The frame sequence was complete but the bytes did not decode.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] DecodeError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the connection can keep serving after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::MalformedMessage(_))
    }
}
