//! Class layout sent to the device

use serde::{Deserialize, Serialize};

use crate::kind::VariableKind;
use crate::token::Token;

/// Field size or method override list, depending on the member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberDetail {
    /// Field occupying this many bytes
    Field {
        /// Storage size in bytes
        size: u16,
        /// Lives in the static area
        is_static: bool,
    },
    /// Method with the tokens of the methods it implements or overrides
    Method {
        /// Base and interface method tokens
        base_tokens: Vec<Token>,
    },
}

/// One field or method of a declared class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMember {
    /// Diagnostic name, never sent
    pub name: String,
    /// Slot tag
    pub kind: VariableKind,
    /// Member token
    pub token: Token,
    /// Size or base tokens
    pub detail: MemberDetail,
}

impl ClassMember {
    /// Create a field member
    pub fn field(name: impl Into<String>, kind: VariableKind, token: Token, size: u16, is_static: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            token,
            detail: MemberDetail::Field { size, is_static },
        }
    }

    /// Create a method member
    pub fn method(name: impl Into<String>, token: Token, base_tokens: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Method,
            token,
            detail: MemberDetail::Method { base_tokens },
        }
    }

    /// Whether this member is a field
    pub fn is_field(&self) -> bool {
        matches!(self.detail, MemberDetail::Field { .. })
    }

    /// Tag byte as sent, with the static marker on static fields
    pub fn wire_kind(&self) -> u8 {
        match self.detail {
            MemberDetail::Field { is_static, .. } => self.kind.wire_byte(is_static),
            MemberDetail::Method { .. } => self.kind.to_byte(),
        }
    }
}

/// Layout of one class as the device sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDeclaration {
    /// Diagnostic name
    pub name: String,
    /// Class token
    pub token: Token,
    /// Parent class token, [`Token::NONE`] for the root
    pub parent: Token,
    /// Bytes of instance data
    pub dynamic_size: u32,
    /// Bytes of static data
    pub static_size: u32,
    /// Instances are stored inline
    pub is_value_type: bool,
    /// Fields and methods in declaration order
    pub members: Vec<ClassMember>,
    /// Implemented interface tokens
    pub interfaces: Vec<Token>,
}

impl ClassDeclaration {
    /// Wire flag word
    pub fn flags(&self) -> u16 {
        u16::from(self.is_value_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_field_wire_kind() {
        let field = ClassMember::field("count", VariableKind::Int32, Token::new(30), 4, true);
        assert!(field.is_field());
        assert_eq!(field.wire_kind(), 0x82);

        let method = ClassMember::method("Run", Token::new(31), vec![Token::new(12)]);
        assert!(!method.is_field());
        assert_eq!(method.wire_kind(), VariableKind::Method.to_byte());
    }
}
