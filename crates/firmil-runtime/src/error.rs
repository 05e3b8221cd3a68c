//! Session errors

use firmil_types::{TaskId, Token};
use firmil_wire::{CommandError, ExecutorCommand, SystemVariableError, WireError};
use std::time::Duration;
use thiserror::Error;

use crate::task::TaskOutcome;

/// Errors raised while talking to the device
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No reply arrived in time
    #[error("Timed out after {elapsed:?} waiting for a reply to {request}")]
    Timeout {
        /// Request that went unanswered
        request: String,
        /// Time waited
        elapsed: Duration,
    },

    /// Device answered with a negative acknowledgement
    #[error("Device rejected {command}: {error}")]
    Command {
        /// Rejected command
        command: ExecutorCommand,
        /// Reason reported by the device
        error: CommandError,
    },

    /// Device speaks a different protocol or native table version
    #[error("Protocol mismatch: host speaks version {expected}, device reports {actual}")]
    ProtocolMismatch {
        /// Version this host implements
        expected: u16,
        /// Version the device reported
        actual: u16,
    },

    /// An earlier protocol mismatch ended the session
    #[error("Session is poisoned by an earlier protocol mismatch")]
    Poisoned,

    /// System variable exchange failed
    #[error("System variable {id}: {status:?}")]
    SystemVariable {
        /// Variable id
        id: u16,
        /// Status reported by the device
        status: SystemVariableError,
    },

    /// Pin operation failed
    #[error("Pin {pin}: {reason}")]
    Pin {
        /// Pin number
        pin: u8,
        /// What went wrong
        reason: String,
    },

    /// Task is not registered with this session
    #[error("Unknown {0}")]
    UnknownTask(TaskId),

    /// The device holds no committed program
    #[error("No committed program on the device; upload it again")]
    ProgramNotLoaded,

    /// A static constructor did not complete
    #[error("Type initializer {token} did not complete: {outcome:?}")]
    TypeInitializer {
        /// Method token of the initializer
        token: Token,
        /// How it ended instead
        outcome: Box<TaskOutcome>,
    },

    /// Every task id is in use
    #[error("No free task id")]
    TasksExhausted,

    /// Frame encoding or reply decoding failed
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Transport failed to carry bytes
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a pin error
    pub fn pin(pin: u8, reason: impl Into<String>) -> Self {
        Self::Pin {
            pin,
            reason: reason.into(),
        }
    }

    /// Whether the session can keep going after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ProtocolMismatch { .. } | Self::Poisoned | Self::Internal(_))
    }

    /// Device command status this error corresponds to
    pub fn command_error(&self) -> Option<CommandError> {
        match self {
            Self::Timeout { .. } => Some(CommandError::Timeout),
            Self::Command { error, .. } => Some(*error),
            _ => None,
        }
    }
}

/// Result type for session operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
