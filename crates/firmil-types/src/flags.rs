//! Method metadata flags

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// Method flags sent with every method declaration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFlags {
    /// Has no receiver
    pub is_static: bool,
    /// Dispatched through the base-token list
    pub is_virtual: bool,
    /// Body is a device-native operation
    pub is_native: bool,
    /// Returns nothing
    pub is_void: bool,
    /// Instance constructor; implicitly returns the receiver
    pub is_ctor: bool,
    /// Abstract or interface stub without a body
    pub is_abstract: bool,
    /// Holds the receiver's monitor for the whole call
    pub is_synchronized: bool,
}

impl MethodFlags {
    const STATIC: u16 = 1;
    const VIRTUAL: u16 = 2;
    const NATIVE: u16 = 4;
    const VOID: u16 = 8;
    const CTOR: u16 = 16;
    const ABSTRACT: u16 = 32;
    const SYNCHRONIZED: u16 = 64;

    /// Encode as the wire bit set
    pub fn to_bits(self) -> u16 {
        let mut bits = 0;
        if self.is_static {
            bits |= Self::STATIC;
        }
        if self.is_virtual {
            bits |= Self::VIRTUAL;
        }
        if self.is_native {
            bits |= Self::NATIVE;
        }
        if self.is_void {
            bits |= Self::VOID;
        }
        if self.is_ctor {
            bits |= Self::CTOR;
        }
        if self.is_abstract {
            bits |= Self::ABSTRACT;
        }
        if self.is_synchronized {
            bits |= Self::SYNCHRONIZED;
        }
        bits
    }

    /// Decode the wire bit set; unknown bits are ignored
    pub fn from_bits(bits: u16) -> Self {
        Self {
            is_static: bits & Self::STATIC != 0,
            is_virtual: bits & Self::VIRTUAL != 0,
            is_native: bits & Self::NATIVE != 0,
            is_void: bits & Self::VOID != 0,
            is_ctor: bits & Self::CTOR != 0,
            is_abstract: bits & Self::ABSTRACT != 0,
            is_synchronized: bits & Self::SYNCHRONIZED != 0,
        }
    }

    /// Reject flag combinations the device cannot honor
    pub fn validate(self) -> TypeResult<()> {
        if self.is_abstract && self.is_native {
            return Err(TypeError::invalid_flags(
                "abstract method cannot resolve to a native operation",
            ));
        }
        if self.is_ctor && self.is_static {
            return Err(TypeError::invalid_flags("constructor cannot be static"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_combine() {
        let flags = MethodFlags {
            is_static: true,
            is_void: true,
            ..Default::default()
        };
        assert_eq!(flags.to_bits(), 9);
        assert_eq!(MethodFlags::from_bits(9), flags);
    }

    #[test]
    fn test_abstract_native_rejected() {
        let flags = MethodFlags {
            is_abstract: true,
            is_native: true,
            ..Default::default()
        };
        assert!(matches!(flags.validate(), Err(TypeError::InvalidFlags(_))));
    }

    #[test]
    fn test_virtual_native_allowed() {
        let flags = MethodFlags {
            is_virtual: true,
            is_native: true,
            ..Default::default()
        };
        assert!(flags.validate().is_ok());
        assert_eq!(flags.to_bits(), 6);
    }
}
