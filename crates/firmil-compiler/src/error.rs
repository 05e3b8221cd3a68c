//! Compilation errors

use firmil_bytecode::TranslationError;
use firmil_resolver::ResolveError;
use firmil_types::{MethodKey, TypeError};
use firmil_wire::WireError;
use thiserror::Error;

/// Errors that end a compilation; none of them reach the device
#[derive(Debug, Error)]
pub enum CompileError {
    /// Entry method is not described by the assembly
    #[error("Entry point {0} not found")]
    EntryNotFound(String),

    /// Reference resolved to a rejection
    #[error("{reference} cannot run on the device: {reason}")]
    Rejected {
        /// Rejected type or method
        reference: String,
        /// Resolver's reason
        reason: String,
    },

    /// IL token missing from the assembly's token table
    #[error("Token 0x{token:08X} in {method} is not in the token table")]
    UnresolvedToken {
        /// Method containing the instruction
        method: MethodKey,
        /// IL token
        token: u32,
    },

    /// Method body failed to translate
    #[error("Invalid body of {method}: {source}")]
    Translation {
        /// Method being translated
        method: MethodKey,
        /// Underlying failure
        #[source]
        source: TranslationError,
    },

    /// Translation failure not yet attributed to a method
    #[error("Invalid method body: {0}")]
    Bytecode(#[from] TranslationError),

    /// Construct the device cannot run
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Program grew past the configured method limit
    #[error("Program exceeds {0} methods")]
    TooManyMethods(usize),

    /// Flag or slot validation failed
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Rule table failed to load
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Message could not be encoded
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create a rejection for a reference
    pub fn rejected(reference: impl ToString, reason: impl Into<String>) -> Self {
        Self::Rejected {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Attribute a bare translation failure to `method`
    pub fn in_method(self, method: &MethodKey) -> Self {
        match self {
            Self::Bytecode(source) => Self::Translation {
                method: method.clone(),
                source,
            },
            other => other,
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = std::result::Result<T, CompileError>;
