//! Model errors

use thiserror::Error;

/// Errors raised while decoding or validating model values
#[derive(Debug, Error)]
pub enum TypeError {
    /// Byte is not a known variable kind
    #[error("Unknown variable kind: {0}")]
    UnknownVariableKind(u8),

    /// Identifier is not in the native-operation table
    #[error("Unknown native method id: {0}")]
    UnknownNativeMethod(u16),

    /// Byte is not a known system exception
    #[error("Unknown system exception: {0}")]
    UnknownSystemException(u8),

    /// Byte is not a known task state
    #[error("Unknown task state: {0}")]
    UnknownTaskState(u8),

    /// Method flags contradict each other
    #[error("Invalid method flags: {0}")]
    InvalidFlags(String),

    /// Value does not fit the slot it is decoded into
    #[error("Value of {actual} bytes does not fit a {expected}-byte slot")]
    SlotSize {
        /// Bytes the slot holds
        expected: usize,
        /// Bytes provided
        actual: usize,
    },

    /// Assembly description could not be parsed
    #[error("Invalid assembly description: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl TypeError {
    /// Create an invalid-flags error
    pub fn invalid_flags(msg: impl Into<String>) -> Self {
        Self::InvalidFlags(msg.into())
    }
}

/// Result type for model operations
pub type TypeResult<T> = std::result::Result<T, TypeError>;
