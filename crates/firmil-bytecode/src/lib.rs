//! # firmil bytecode
//!
//! Decodes CIL method bodies and rebuilds them for a device with no room for
//! dead code.
//!
//! ## Design Principles
//!
//! - **Table driven**: One opcode table gives size, operand and flow for every instruction
//! - **Arena graph**: Nodes live in a vector and link by index, never by owning pointer
//! - **Fail loudly**: A branch that leaves the body is an error, never clipped
//! - **Forward reachability**: Only instructions reachable from the entry or a live handler survive

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod graph;
pub mod instruction;
pub mod opcode;

pub use error::{BytecodeResult, TranslationError};
pub use graph::{ControlFlowGraph, EmittedBody, Node, NodeIndex, NodeRole};
pub use instruction::{Instruction, Operand, decode_method};
pub use opcode::{FlowControl, Opcode, OperandType};

/// Bodies this long or longer cannot be addressed by the device's 16-bit offsets
pub const MAX_METHOD_SIZE: usize = u16::MAX as usize - 1;
