//! # firmil compiler
//!
//! Turns an entry point of a described assembly into the command sequence that
//! uploads it to the device interpreter.
//!
//! ## Pipeline
//!
//! 1. Resolve the entry point and every reference reachable from it
//! 2. Prune each body to its reachable instructions and patch in session tokens
//! 3. Declare the classes the program touches, parents first
//! 4. Encode classes, methods and constants as frames

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod program;

pub use compiler::Compiler;
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use program::{CompiledMethod, CompiledProgram, Constant};
