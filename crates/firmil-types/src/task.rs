//! Task lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TypeError, TypeResult};

/// Identifier of one method execution on the device (14 bits on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TaskId(pub u16);

impl TaskId {
    /// Largest id that survives 14-bit packing
    pub const MAX: u16 = 0x3FFF;

    /// Create a task id
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw id
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Observable state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Created on the host, not yet started
    NotStarted,
    /// Executing on the device
    Running,
    /// Waiting on a hardware event
    SuspendedOnHardwareWait,
    /// Terminated by an unhandled fault
    KilledByException,
    /// Returned normally
    Completed,
    /// Terminated on request
    Aborted,
}

impl TaskState {
    /// Decode the state byte of a termination or status reply
    pub fn from_wire(b: u8) -> TypeResult<Self> {
        match b {
            0 => Ok(Self::Completed),
            1 => Ok(Self::KilledByException),
            2 => Ok(Self::Running),
            3 => Ok(Self::Aborted),
            4 => Ok(Self::SuspendedOnHardwareWait),
            other => Err(TypeError::UnknownTaskState(other)),
        }
    }

    /// State byte as the device reports it; `NotStarted` never crosses the link
    pub const fn to_wire(self) -> Option<u8> {
        match self {
            Self::NotStarted => None,
            Self::Completed => Some(0),
            Self::KilledByException => Some(1),
            Self::Running => Some(2),
            Self::Aborted => Some(3),
            Self::SuspendedOnHardwareWait => Some(4),
        }
    }

    /// Whether the task can make no further progress
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::KilledByException | Self::Completed | Self::Aborted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_states() {
        for state in [
            TaskState::Running,
            TaskState::SuspendedOnHardwareWait,
            TaskState::KilledByException,
            TaskState::Completed,
            TaskState::Aborted,
        ] {
            let b = state.to_wire().unwrap();
            assert_eq!(TaskState::from_wire(b).unwrap(), state);
        }
        assert_eq!(TaskState::NotStarted.to_wire(), None);
        assert!(TaskState::from_wire(9).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(!TaskState::SuspendedOnHardwareWait.is_terminal());
        assert!(!TaskState::NotStarted.is_terminal());
    }
}
