//! # firmil types
//!
//! Shared model for compiling managed methods onto a microcontroller interpreter.
//!
//! ## Design Principles
//!
//! - **Tagged slots**: Every storage slot carries a [`VariableKind`] before its bytes are read
//! - **Session tokens**: Types, methods, fields and strings are named by small integers
//! - **Closed contract**: Native operations, task states and faults are fixed enums shared with firmware
//! - **Serializable input**: Assemblies are described as plain data, not loaded by reflection

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod exception;
pub mod flags;
pub mod kind;
pub mod member;
pub mod metadata;
pub mod native;
pub mod region;
pub mod task;
pub mod token;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use exception::SystemException;
pub use flags::MethodFlags;
pub use kind::VariableKind;
pub use member::{ClassDeclaration, ClassMember, MemberDetail};
pub use metadata::{
    Assembly, FieldDef, LocalDef, MetadataRef, MethodDef, MethodKey, Parameter, TypeDef,
};
pub use native::NativeMethod;
pub use region::{ClauseKind, ExceptionRegion};
pub use task::{TaskId, TaskState};
pub use token::{KnownTypeToken, Token};
pub use value::Value;

/// Version of the native-operation table and wire layout shared with firmware
pub const NATIVE_TABLE_VERSION: u16 = 1;
