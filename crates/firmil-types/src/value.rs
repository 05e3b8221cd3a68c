//! Tagged values exchanged with running tasks
//!
//! Task arguments and results cross the link as raw little-endian slot images.
//! A [`Value`] pairs such an image with the [`VariableKind`] needed to read it.
//!
//! ## Slot Layout
//!
//! ```text
//! narrow slot:  4 bytes  Int32 | Uint32 | Boolean | Float | Object
//! wide slot:    8 bytes  Int64 | Uint64 | Double   (kind byte has 0x10 set)
//! void:         0 bytes
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::kind::VariableKind;

/// A value as stored in one device slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value
    Void,
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Boolean
    Boolean(bool),
    /// 32-bit float
    Float(f32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// 64-bit float
    Double(f64),
    /// Opaque device object handle
    Object(u32),
}

impl Value {
    /// Tag of the slot this value occupies
    pub const fn kind(&self) -> VariableKind {
        match self {
            Self::Void => VariableKind::Void,
            Self::Int32(_) => VariableKind::Int32,
            Self::Uint32(_) => VariableKind::Uint32,
            Self::Boolean(_) => VariableKind::Boolean,
            Self::Float(_) => VariableKind::Float,
            Self::Int64(_) => VariableKind::Int64,
            Self::Uint64(_) => VariableKind::Uint64,
            Self::Double(_) => VariableKind::Double,
            Self::Object(_) => VariableKind::Object,
        }
    }

    /// Little-endian slot image
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Void => Vec::new(),
            Self::Int32(v) => v.to_le_bytes().to_vec(),
            Self::Uint32(v) | Self::Object(v) => v.to_le_bytes().to_vec(),
            Self::Boolean(v) => u32::from(v).to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::Uint64(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Read a slot image of the given kind
    ///
    /// Narrow kinds accept a wide image and read its low half, since the device
    /// reports results in whole slots.
    pub fn from_bytes(kind: VariableKind, bytes: &[u8]) -> TypeResult<Self> {
        let expected = kind.slot_size();
        if bytes.len() < expected {
            return Err(TypeError::SlotSize {
                expected,
                actual: bytes.len(),
            });
        }
        let narrow = || {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[..4]);
            buf
        };
        let wide = || {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            buf
        };
        Ok(match kind {
            VariableKind::Void => Self::Void,
            VariableKind::Int32 => Self::Int32(i32::from_le_bytes(narrow())),
            VariableKind::Uint32 => Self::Uint32(u32::from_le_bytes(narrow())),
            VariableKind::Boolean => Self::Boolean(u32::from_le_bytes(narrow()) != 0),
            VariableKind::Float => Self::Float(f32::from_le_bytes(narrow())),
            VariableKind::Int64 => Self::Int64(i64::from_le_bytes(wide())),
            VariableKind::Uint64 => Self::Uint64(u64::from_le_bytes(wide())),
            VariableKind::Double => Self::Double(f64::from_le_bytes(wide())),
            _ => Self::Object(u32::from_le_bytes(narrow())),
        })
    }

    /// Get as i32 if this is an Int32
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Int32(v) => Some(v),
            _ => None,
        }
    }
}
