//! Error taxonomy for the logger wire protocol (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtkError {
    #[error("{0}")]
    SystemIo(#[from] std::io::Error),

    #[error("Error parsing logger response: {0}")]
    ParseError(String),

    #[error("Checksum error")]
    ChecksumMismatch,

    #[error("No response from logger")]
    NoResponse,

    #[error("Unexpected response from logger: {0}")]
    UnexpectedResponse(String),

    #[error("Error in command received by logger")]
    InvalidCommand,

    #[error("Memory allocation error")]
    AllocationFailure,
}

pub type Result<T> = std::result::Result<T, RtkError>;
