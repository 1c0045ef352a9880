//! Error types for cabinet protocol parsing and encoding

use thiserror::Error;

use crate::jvs::ResponseStatus;

/// Errors that can occur while parsing or building protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Unknown or unsupported command
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Payload does not fit in a single packet
    #[error("payload too long: {0} bytes")]
    PayloadTooLong(usize),

    /// Response payload shorter than the command requires
    #[error("short response to {command}: need {needed} bytes, got {got}")]
    ShortResponse {
        command: &'static str,
        needed: usize,
        got: usize,
    },

    /// Device reported a non-normal packet status
    #[error("device status {0}")]
    BadStatus(ResponseStatus),

    /// Device reported a non-normal per-command report
    #[error("{command} report 0x{report:02X}")]
    BadReport { command: &'static str, report: u8 },
}
