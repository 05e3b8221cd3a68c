//! Slot tags

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

/// How the bytes of a storage slot are interpreted by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VariableKind {
    /// No value
    Void = 0,
    /// Unsigned 32-bit integer
    Uint32 = 1,
    /// Signed 32-bit integer
    Int32 = 2,
    /// Boolean stored in 32 bits
    Boolean = 3,
    /// Object reference
    Object = 4,
    /// Method reference
    Method = 5,
    /// Array of inline value types
    ValueArray = 6,
    /// Array of references
    ReferenceArray = 7,
    /// 32-bit float
    Float = 8,
    /// Value type spilling into auxiliary storage
    LargeValueType = 9,
    /// Signed 64-bit integer
    Int64 = 17,
    /// Unsigned 64-bit integer
    Uint64 = 18,
    /// 64-bit float
    Double = 20,
    /// Managed reference
    Reference = 32,
    /// Runtime field handle
    RuntimeFieldHandle = 33,
    /// Runtime type handle
    RuntimeTypeHandle = 34,
    /// Address of a local or argument
    AddressOfVariable = 35,
    /// Function pointer
    FunctionPointer = 36,
    /// Static member whose kind is fixed by its first assignment
    StaticMember = 128,
}

impl VariableKind {
    /// Marker bit carried by every 8-byte kind
    pub const WIDE_MARKER: u8 = 0x10;

    /// Bit OR-ed onto the kind of a static field
    pub const STATIC_MARKER: u8 = 0x80;

    /// Decode a tag byte, ignoring the static marker on concrete kinds
    pub fn from_byte(byte: u8) -> Option<Self> {
        let base = if byte == Self::STATIC_MARKER {
            byte
        } else {
            byte & !Self::STATIC_MARKER
        };
        Some(match base {
            0 => Self::Void,
            1 => Self::Uint32,
            2 => Self::Int32,
            3 => Self::Boolean,
            4 => Self::Object,
            5 => Self::Method,
            6 => Self::ValueArray,
            7 => Self::ReferenceArray,
            8 => Self::Float,
            9 => Self::LargeValueType,
            17 => Self::Int64,
            18 => Self::Uint64,
            20 => Self::Double,
            32 => Self::Reference,
            33 => Self::RuntimeFieldHandle,
            34 => Self::RuntimeTypeHandle,
            35 => Self::AddressOfVariable,
            36 => Self::FunctionPointer,
            128 => Self::StaticMember,
            _ => return None,
        })
    }

    /// Decode a tag byte or fail
    pub fn try_from_byte(byte: u8) -> TypeResult<Self> {
        Self::from_byte(byte).ok_or(TypeError::UnknownVariableKind(byte))
    }

    /// Tag byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Tag byte as sent for a field, with the static marker when requested
    #[inline]
    pub const fn wire_byte(self, is_static: bool) -> u8 {
        if is_static {
            self as u8 | Self::STATIC_MARKER
        } else {
            self as u8
        }
    }

    /// Whether the slot occupies 8 bytes
    #[inline]
    pub const fn is_wide(self) -> bool {
        !matches!(self, Self::StaticMember) && (self as u8) & Self::WIDE_MARKER != 0
    }

    /// Bytes of slot storage
    #[inline]
    pub const fn slot_size(self) -> usize {
        match self {
            Self::Void => 0,
            _ if self.is_wide() => 8,
            _ => 4,
        }
    }

    /// Whether the slot holds a reference the device must trace
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            Self::Object | Self::ValueArray | Self::ReferenceArray | Self::Method | Self::Reference
        )
    }

    /// Kind used for a value of the named primitive type, if it is one
    pub fn for_primitive(type_name: &str) -> Option<Self> {
        Some(match type_name {
            "System.Void" => Self::Void,
            "System.Boolean" => Self::Boolean,
            "System.Byte" | "System.UInt16" | "System.UInt32" | "System.Char" => Self::Uint32,
            "System.SByte" | "System.Int16" | "System.Int32" => Self::Int32,
            "System.Int64" => Self::Int64,
            "System.UInt64" => Self::Uint64,
            "System.Single" => Self::Float,
            "System.Double" => Self::Double,
            "System.IntPtr" | "System.UIntPtr" => Self::Int32,
            "System.RuntimeTypeHandle" => Self::RuntimeTypeHandle,
            "System.RuntimeFieldHandle" => Self::RuntimeFieldHandle,
            _ => return None,
        })
    }

    /// Get the name of this kind
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "Void",
            Self::Uint32 => "Uint32",
            Self::Int32 => "Int32",
            Self::Boolean => "Boolean",
            Self::Object => "Object",
            Self::Method => "Method",
            Self::ValueArray => "ValueArray",
            Self::ReferenceArray => "ReferenceArray",
            Self::Float => "Float",
            Self::LargeValueType => "LargeValueType",
            Self::Int64 => "Int64",
            Self::Uint64 => "Uint64",
            Self::Double => "Double",
            Self::Reference => "Reference",
            Self::RuntimeFieldHandle => "RuntimeFieldHandle",
            Self::RuntimeTypeHandle => "RuntimeTypeHandle",
            Self::AddressOfVariable => "AddressOfVariable",
            Self::FunctionPointer => "FunctionPointer",
            Self::StaticMember => "StaticMember",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [VariableKind; 19] = [
        VariableKind::Void,
        VariableKind::Uint32,
        VariableKind::Int32,
        VariableKind::Boolean,
        VariableKind::Object,
        VariableKind::Method,
        VariableKind::ValueArray,
        VariableKind::ReferenceArray,
        VariableKind::Float,
        VariableKind::LargeValueType,
        VariableKind::Int64,
        VariableKind::Uint64,
        VariableKind::Double,
        VariableKind::Reference,
        VariableKind::RuntimeFieldHandle,
        VariableKind::RuntimeTypeHandle,
        VariableKind::AddressOfVariable,
        VariableKind::FunctionPointer,
        VariableKind::StaticMember,
    ];

    #[test]
    fn test_wide_marker_matches_slot_size() {
        for kind in ALL {
            assert_eq!(kind.is_wide(), kind.slot_size() == 8, "{}", kind.name());
        }
        assert!(VariableKind::Int64.is_wide());
        assert!(VariableKind::Double.is_wide());
        assert!(!VariableKind::Float.is_wide());
    }

    #[test]
    fn test_static_marker_is_stripped() {
        let byte = VariableKind::Int32.wire_byte(true);
        assert_eq!(byte, 130);
        assert_eq!(VariableKind::from_byte(byte), Some(VariableKind::Int32));
        assert_eq!(VariableKind::from_byte(128), Some(VariableKind::StaticMember));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(VariableKind::from_byte(10).is_none());
        assert!(matches!(
            VariableKind::try_from_byte(19),
            Err(TypeError::UnknownVariableKind(19))
        ));
    }

    #[test]
    fn test_primitive_kinds() {
        assert_eq!(VariableKind::for_primitive("System.Int64"), Some(VariableKind::Int64));
        assert_eq!(VariableKind::for_primitive("System.Char"), Some(VariableKind::Uint32));
        assert_eq!(VariableKind::for_primitive("Demo.Point"), None);
    }
}
