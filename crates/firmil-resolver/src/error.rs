//! Resolver errors

use firmil_types::MethodKey;
use thiserror::Error;

/// Errors raised while loading rules or resolving references
///
/// A `Reject` decision is not an error: it is an ordinary outcome the
/// compiler turns into its own failure with context.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Rule names a type the assembly does not describe
    #[error("Rule {index} is invalid: {reason}")]
    InvalidRule {
        /// Position in the rule table
        index: usize,
        /// What is wrong
        reason: String,
    },

    /// Reference to a type the assembly does not describe
    #[error("Unknown type {0}")]
    UnknownType(String),

    /// Reference to a method the assembly does not describe
    #[error("Unknown method {0}")]
    UnknownMethod(MethodKey),

    /// Rule table is not valid TOML
    #[error("Invalid rule table: {0}")]
    Toml(#[from] toml::de::Error),

    /// Rule table is not valid JSON
    #[error("Invalid rule table: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResolveError {
    /// Create an invalid-rule error
    pub fn invalid_rule(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for resolver operations
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
