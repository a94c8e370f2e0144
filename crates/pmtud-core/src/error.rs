//! Error types for path MTU discovery.

use crate::result::ErrorKind;
use crate::types::IpFamily;
use thiserror::Error;

/// Main error type for discovery operations.
#[derive(Error, Debug)]
pub enum PmtuError {
    // DNS errors
    #[error("failed to resolve hostname {hostname}: {reason}")]
    ResolutionFailed { hostname: String, reason: String },

    // Path errors
    #[error("destination unreachable")]
    Unreachable,

    #[error("probe deadline exceeded")]
    Timeout,

    #[error("path blocks the minimum {family} datagram size ({floor} bytes)")]
    FragmentationBlocked { family: IpFamily, floor: u16 },

    // Socket/IO errors
    #[error("failed to create socket: {0}")]
    SocketCreation(#[source] std::io::Error),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    // Configuration errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid search range: floor={floor}, ceiling={ceiling}")]
    InvalidRange { floor: u16, ceiling: u16 },

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl PmtuError {
    /// Maps this error onto the stable classification reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailure,
            Self::Unreachable => ErrorKind::Unreachable,
            Self::Timeout => ErrorKind::Timeout,
            Self::FragmentationBlocked { .. } => ErrorKind::FragmentationBlocked,
            Self::SocketCreation(_) | Self::SendFailed(_) | Self::Transport(_) | Self::Internal(_) => {
                ErrorKind::TransportError
            }
            Self::InvalidInput(_) | Self::InvalidRange { .. } => ErrorKind::InvalidInput,
        }
    }
}

impl From<std::io::Error> for PmtuError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => PmtuError::Timeout,
            std::io::ErrorKind::WouldBlock => PmtuError::Timeout,
            _ => PmtuError::Transport(err.to_string()),
        }
    }
}

/// Result type alias for discovery operations.
pub type PmtuResult<T> = Result<T, PmtuError>;
