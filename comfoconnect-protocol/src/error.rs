//! Error types for the ComfoConnect wire protocol.

use thiserror::Error;

use crate::types::DeviceId;

/// Protocol-level errors that can occur while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Operation tag has no registered payload schema.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(i32),

    /// Frame is larger than the protocol allows.
    #[error("Frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(u32, u32),

    /// Declared length is smaller than the fixed envelope part.
    #[error("Frame too short: declared {0} bytes")]
    FrameTooShort(u32),

    /// Frame payload is incomplete.
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Frame carries bytes beyond its declared length.
    #[error("Trailing bytes after frame: expected {expected} bytes, got {actual}")]
    TrailingBytes { expected: usize, actual: usize },

    /// Header length points past the end of the frame.
    #[error("Header length {header_len} exceeds frame body of {body_len} bytes")]
    HeaderOverflow { header_len: usize, body_len: usize },

    /// Failed to decode a header or payload record.
    #[error("Failed to decode message: {0}")]
    DecodeError(String),

    /// Failed to encode a header or payload record.
    #[error("Failed to encode message: {0}")]
    EncodeError(String),

    /// Device identity does not have exactly 16 bytes.
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// Frame was addressed to another identity.
    #[error("Frame addressed to {actual}, expected {expected}")]
    ForeignDestination { expected: DeviceId, actual: DeviceId },
}

impl From<prost::DecodeError> for ProtocolError {
    fn from(e: prost::DecodeError) -> Self {
        ProtocolError::DecodeError(e.to_string())
    }
}

impl From<prost::EncodeError> for ProtocolError {
    fn from(e: prost::EncodeError) -> Self {
        ProtocolError::EncodeError(e.to_string())
    }
}
