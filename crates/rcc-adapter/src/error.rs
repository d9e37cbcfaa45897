//! Error types for adapters and radio links

use thiserror::Error;

use crate::types::{CommandResult, ResultCode};

/// Errors an adapter reports back to the orchestrator
///
/// Each variant maps onto exactly one [`ResultCode`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    /// Requested value is outside the adapter's capabilities
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// The radio is executing another command
    #[error("radio busy: {0}")]
    Busy(String),

    /// The radio or its link is down
    #[error("radio unavailable: {0}")]
    Unavailable(String),

    /// The radio did not answer within the operation's time budget
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Time budget that was exceeded (milliseconds)
        after_ms: u64,
    },

    /// Unexpected fault inside the adapter
    #[error("internal adapter fault: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Result code this error resolves to
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidRange(_) => ResultCode::InvalidRange,
            Self::Busy(_) => ResultCode::Busy,
            Self::Unavailable(_) | Self::Timeout { .. } => ResultCode::Unavailable,
            Self::Internal(_) => ResultCode::InternalError,
        }
    }
}

impl From<AdapterError> for CommandResult {
    fn from(err: AdapterError) -> Self {
        CommandResult::new(err.code(), err.to_string())
    }
}

/// Result type for adapter operations
pub type AdapterResult<T = ()> = Result<T, AdapterError>;

/// Errors raised by a radio link while performing I/O
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The endpoint could not be reached
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// An established link dropped
    #[error("link lost: {0}")]
    Lost(String),

    /// The radio answered but refused the request with a vendor token
    #[error("rejected by radio: {0}")]
    Rejected(String),
}

impl LinkError {
    /// Whether the link itself is still healthy after this error
    pub fn link_survives(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
