//! Error types for the Tributary event store
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Per-request negative outcomes (wrong expected version, deleted stream,
//! missing event) are *not* errors at the API surface — they travel as typed
//! result enums (`WriteOutcome`, `ReadOutcome`). The variants here cover the
//! fallible infrastructure path: disk I/O, on-disk corruption, and protocol
//! decoding. Physical storage failure is never converted into a client-visible
//! result code; it propagates up until the caller halts the writer.

use std::io;
use thiserror::Error;

/// Result type alias for Tributary operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Tributary event store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (chunk files, checkpoint files, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad magic, torn frame)
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Caller's expected version does not match the stream head
    #[error("wrong expected version for stream '{stream}': expected {expected}, actual {actual}")]
    WrongExpectedVersion {
        /// Stream the write targeted
        stream: String,
        /// Version the caller asserted
        expected: i64,
        /// Head actually observed at check time
        actual: i64,
    },

    /// Stream has been deleted; no retry will succeed
    #[error("stream '{0}' has been deleted")]
    StreamDeleted(String),

    /// Log position lies beyond the writer checkpoint or inside padding
    #[error("no record at log position {0}")]
    PositionNotFound(u64),

    /// Wire package carried a command byte this node does not understand
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    /// Wire payload could not be decoded
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Invalid operation or state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_display_wrong_expected_version() {
        let err = Error::WrongExpectedVersion {
            stream: "acct-1".to_string(),
            expected: 3,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("acct-1"));
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("actual 5"));
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::Corruption("CRC check failed".to_string());
        let msg = err.to_string();
        assert!(msg.contains("data corruption"));
        assert!(msg.contains("CRC check failed"));
    }

    #[test]
    fn test_error_display_unknown_command() {
        let err = Error::UnknownCommand(0xFE);
        assert!(err.to_string().contains("0xfe"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
