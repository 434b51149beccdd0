//! Error types for the bluegap library
//!
//! Every synchronous entry point returns a [`GapResult`]. Outcomes that are
//! delivered through callbacks use [`SecurityResult`](crate::gap::SecurityResult)
//! instead, so a request is never lost to an early `Err`.

use thiserror::Error;

/// Errors returned by the GAP security engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GapError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Transport is not enabled")]
    NotEnabled,

    #[error("Equivalent registration already exists")]
    Repeated,

    #[error("Invalid state for operation")]
    InvalidState,

    #[error("Operation not supported")]
    NotSupported,

    #[error("Task queue cannot accept new work")]
    ResourceExhausted,

    #[error("Controller rejected command with status 0x{0:02X}")]
    Controller(u8),

    #[error("Operation timed out")]
    Timeout,

    #[error("Waiting for task completion failed")]
    WaitFailed,

    #[error("Dispatcher has stopped")]
    Stopped,

    #[error("Signature counter is behind the stored counter")]
    Replay,
}

/// Result type for GAP operations
pub type GapResult<T> = Result<T, GapError>;

impl GapError {
    /// HCI-style status byte used when an error has to be folded into a
    /// request's terminal status.
    pub fn status_code(&self) -> u8 {
        match self {
            GapError::Controller(status) => *status,
            GapError::Timeout => crate::hci::constants::HCI_CONNECTION_TIMEOUT,
            GapError::NotSupported => crate::hci::constants::HCI_UNSUPPORTED_FEATURE,
            GapError::InvalidParameter(_) => crate::hci::constants::HCI_INVALID_PARAMETERS,
            _ => crate::hci::constants::HCI_UNSPECIFIED_ERROR,
        }
    }
}
