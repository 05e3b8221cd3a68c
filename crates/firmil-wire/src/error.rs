//! Wire errors and device-reported status codes

use firmil_types::TypeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding frames or decoding replies
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload byte with the high bit set
    #[error("Byte 0x{byte:02X} at {offset} is not 7-bit safe")]
    HighBitSet {
        /// Position in the payload
        offset: usize,
        /// Offending byte
        byte: u8,
    },

    /// Reply shorter than its layout
    #[error("Reply truncated: needed {needed} bytes, got {actual}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes present
        actual: usize,
    },

    /// Frame exceeds the negotiated message size
    #[error("Frame of {size} bytes exceeds the maximum message size of {max}")]
    MessageTooLarge {
        /// Encoded frame size
        size: usize,
        /// Negotiated maximum
        max: usize,
    },

    /// Value does not fit its packed field
    #[error("{field} value {value} does not fit in {bits} bits")]
    ValueOutOfRange {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u64,
        /// Available bits
        bits: u32,
    },

    /// Negotiated message size leaves no room for payload
    #[error("Maximum message size {0} is too small")]
    MessageSizeTooSmall(usize),

    /// Unknown executor command code
    #[error("Unknown executor command 0x{0:02X}")]
    UnknownCommand(u8),

    /// Reply did not match any known layout
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Slot or enum decoding failed
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl WireError {
    /// Create an unexpected-reply error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedReply(msg.into())
    }

    pub(crate) fn out_of_range(field: &'static str, value: impl Into<u64>, bits: u32) -> Self {
        Self::ValueOutOfRange {
            field,
            value: value.into(),
            bits,
        }
    }
}

/// Result type for wire operations
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Status the device reports for a rejected command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandError {
    /// No error
    None = 0,
    /// Engine is executing and cannot accept the command
    EngineBusy = 1,
    /// Arguments were malformed
    InvalidArguments = 2,
    /// Device memory exhausted
    OutOfMemory = 3,
    /// Firmware internal failure
    InternalError = 4,
    /// Device or host gave up waiting
    Timeout = 5,
    /// Device restarted mid-session
    DeviceReset = 6,
    /// Task was aborted
    Aborted = 7,
}

impl CommandError {
    /// Decode from a status byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::EngineBusy),
            2 => Some(Self::InvalidArguments),
            3 => Some(Self::OutOfMemory),
            4 => Some(Self::InternalError),
            5 => Some(Self::Timeout),
            6 => Some(Self::DeviceReset),
            7 => Some(Self::Aborted),
            _ => None,
        }
    }

    /// Get display name
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::EngineBusy => "EngineBusy",
            Self::InvalidArguments => "InvalidArguments",
            Self::OutOfMemory => "OutOfMemory",
            Self::InternalError => "InternalError",
            Self::Timeout => "Timeout",
            Self::DeviceReset => "DeviceReset",
            Self::Aborted => "Aborted",
        }
    }

    /// Whether the condition is about the link rather than the command
    pub const fn is_transport(self) -> bool {
        matches!(self, Self::Timeout | Self::DeviceReset)
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a system variable exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemVariableError {
    /// Exchange succeeded
    Success = 0,
    /// Variable cannot be written
    FieldReadOnly = 1,
    /// Variable cannot be read
    FieldWriteOnly = 2,
    /// Data type not understood
    UnknownDataType = 3,
    /// No such variable
    UnknownVariableId = 4,
    /// Other failure
    GenericError = 5,
}

impl SystemVariableError {
    /// Decode from a status byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Success),
            1 => Some(Self::FieldReadOnly),
            2 => Some(Self::FieldWriteOnly),
            3 => Some(Self::UnknownDataType),
            4 => Some(Self::UnknownVariableId),
            5 => Some(Self::GenericError),
            _ => None,
        }
    }
}
