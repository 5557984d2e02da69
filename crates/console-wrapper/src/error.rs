//! Error types for wrapper operations

use thiserror::Error;

use crate::wrapper::WrapperState;

/// Unified error type for wrapper operations
#[derive(Error, Debug)]
pub enum Error {
    /// A constructor argument was rejected
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected
        reason: String,
    },

    /// An operation was attempted in a lifecycle state that forbids it
    #[error("cannot {operation}: {reason}")]
    InvalidState {
        /// The operation that was attempted
        operation: &'static str,
        /// Why the operation is not allowed right now
        reason: String,
    },

    /// The operating system refused to start the process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// The operating system refused to signal the process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

// For convenience, re-export specific error constructors
impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an invalid state error from the wrapper's lifecycle state
    pub fn invalid_state(operation: &'static str, state: WrapperState) -> Self {
        Self::InvalidState {
            operation,
            reason: format!("wrapper is {state}"),
        }
    }

    /// Create an invalid state error with a bespoke reason
    pub fn invalid_state_reason(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
