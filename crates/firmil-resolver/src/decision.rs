//! Resolution outcomes

use firmil_types::{MethodKey, NativeMethod};
use serde::Serialize;
use std::fmt;

/// What a reimplementation points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    /// Replacing method
    Method(MethodKey),
    /// Replacing type
    Type(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(key) => write!(f, "{key}"),
            Self::Type(name) => f.write_str(name),
        }
    }
}

/// How a referenced type or method is realized on the device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Decision {
    /// Compile the original as declared
    UseOriginal,
    /// Compile the reimplementation instead
    UseReimplementation(Target),
    /// Firmware implements it; no body is sent
    UseNativeOperation(NativeMethod),
    /// Cannot run on the device
    Reject(String),
}

impl Decision {
    pub(crate) fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }

    /// Whether the reference cannot be compiled
    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }

    /// Numeric firmware id of a native decision
    pub fn native_id(&self) -> Option<u16> {
        match self {
            Self::UseNativeOperation(native) => Some(native.id()),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseOriginal => f.write_str("original"),
            Self::UseReimplementation(target) => write!(f, "replaced by {target}"),
            Self::UseNativeOperation(native) => write!(f, "native {} ({})", native.name(), native.id()),
            Self::Reject(reason) => write!(f, "rejected: {reason}"),
        }
    }
}
