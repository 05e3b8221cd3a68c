//! Session tokens

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-scoped identifier of a type, method, field or string constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Token(pub u32);

impl Token {
    /// The null token (no parent, no catch type)
    pub const NONE: Token = Token(0);

    /// First token handed out to entities that are not well-known types
    pub const FIRST_DYNAMIC: Token = Token(KnownTypeToken::LARGEST + 1);

    /// Create a token
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw token value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this is the null token
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Whether this token is reserved for a well-known type
    #[inline]
    pub const fn is_known_type(self) -> bool {
        self.0 != 0 && self.0 <= KnownTypeToken::LARGEST
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Tokens the firmware knows without being told
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum KnownTypeToken {
    /// `System.Object`
    Object = 1,
    /// `System.Type`
    Type = 2,
    /// `System.ValueType`
    ValueType = 3,
    /// `System.String`
    String = 4,
    /// `System.Reflection.TypeInfo`
    TypeInfo = 5,
    /// `System.RuntimeType`
    RuntimeType = 6,
    /// `System.Nullable`1`
    Nullable = 7,
    /// `System.Enum`
    Enum = 8,
    /// `System.Array`
    Array = 9,
    /// `System.ByReference`1` over bytes
    ByReferenceByte = 10,
    /// `System.Delegate`
    Delegate = 11,
    /// `System.MulticastDelegate`
    MulticastDelegate = 12,
}

impl KnownTypeToken {
    /// Highest token value reserved for well-known types
    pub const LARGEST: u32 = 20;

    /// All well-known types in token order
    pub const ALL: [KnownTypeToken; 12] = [
        Self::Object,
        Self::Type,
        Self::ValueType,
        Self::String,
        Self::TypeInfo,
        Self::RuntimeType,
        Self::Nullable,
        Self::Enum,
        Self::Array,
        Self::ByReferenceByte,
        Self::Delegate,
        Self::MulticastDelegate,
    ];

    /// Full type name this token stands for
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Object => "System.Object",
            Self::Type => "System.Type",
            Self::ValueType => "System.ValueType",
            Self::String => "System.String",
            Self::TypeInfo => "System.Reflection.TypeInfo",
            Self::RuntimeType => "System.RuntimeType",
            Self::Nullable => "System.Nullable`1",
            Self::Enum => "System.Enum",
            Self::Array => "System.Array",
            Self::ByReferenceByte => "System.ByReference`1",
            Self::Delegate => "System.Delegate",
            Self::MulticastDelegate => "System.MulticastDelegate",
        }
    }

    /// Look up a well-known type by full name
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    /// The reserved token
    #[inline]
    pub const fn token(self) -> Token {
        Token(self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens_are_reserved() {
        for known in KnownTypeToken::ALL {
            assert!(known.token().is_known_type());
            assert_eq!(KnownTypeToken::from_type_name(known.type_name()), Some(known));
        }
        assert!(!Token::FIRST_DYNAMIC.is_known_type());
        assert_eq!(Token::FIRST_DYNAMIC.value(), 21);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(Token::new(0x2A).to_string(), "0x2A");
        assert!(Token::NONE.is_none());
    }
}
