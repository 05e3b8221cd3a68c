//! Runtime faults reported by the device

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TypeError, TypeResult};

/// Fault that terminated a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemException {
    /// No fault
    None = 0,
    /// Interpreter stack exhausted
    StackOverflow = 1,
    /// Null dereference
    NullReference = 2,
    /// Method token unknown to the device
    MissingMethod = 3,
    /// Opcode the interpreter does not implement
    InvalidOpCode = 4,
    /// Integer division by zero
    DivideByZero = 5,
    /// Array index out of bounds
    IndexOutOfRange = 6,
    /// Heap exhausted
    OutOfMemory = 7,
    /// Array store of the wrong element type
    ArrayTypeMismatch = 8,
    /// Operation invalid in the current state
    InvalidOperation = 9,
    /// Class token unknown to the device
    ClassNotFound = 10,
    /// Failed cast
    InvalidCast = 11,
    /// Operation stubbed out on the device
    NotSupported = 12,
}

impl SystemException {
    /// Decode a fault byte
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::None,
            1 => Self::StackOverflow,
            2 => Self::NullReference,
            3 => Self::MissingMethod,
            4 => Self::InvalidOpCode,
            5 => Self::DivideByZero,
            6 => Self::IndexOutOfRange,
            7 => Self::OutOfMemory,
            8 => Self::ArrayTypeMismatch,
            9 => Self::InvalidOperation,
            10 => Self::ClassNotFound,
            11 => Self::InvalidCast,
            12 => Self::NotSupported,
            _ => return Option::None,
        })
    }

    /// Decode a fault code as reported in a termination reply
    pub fn try_from_code(code: u32) -> TypeResult<Self> {
        u8::try_from(code)
            .ok()
            .and_then(Self::from_byte)
            .ok_or(TypeError::UnknownSystemException(code.min(u32::from(u8::MAX)) as u8))
    }

    /// Managed exception type the fault corresponds to
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::StackOverflow => "System.StackOverflowException",
            Self::NullReference => "System.NullReferenceException",
            Self::MissingMethod => "System.MissingMethodException",
            Self::InvalidOpCode => "System.InvalidProgramException",
            Self::DivideByZero => "System.DivideByZeroException",
            Self::IndexOutOfRange => "System.IndexOutOfRangeException",
            Self::OutOfMemory => "System.OutOfMemoryException",
            Self::ArrayTypeMismatch => "System.ArrayTypeMismatchException",
            Self::InvalidOperation => "System.InvalidOperationException",
            Self::ClassNotFound => "System.TypeLoadException",
            Self::InvalidCast => "System.InvalidCastException",
            Self::NotSupported => "System.NotSupportedException",
        }
    }
}

impl fmt::Display for SystemException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
