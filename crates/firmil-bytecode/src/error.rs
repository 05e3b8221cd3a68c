//! Translation errors

use thiserror::Error;

/// Errors found while decoding or rebuilding a method body
///
/// All of these are detected on the host and end the compilation of the method.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// Byte sequence is not an opcode
    #[error("Unknown opcode 0x{code:04X} at IL_{offset:04X}")]
    UnknownOpcode {
        /// Instruction offset
        offset: u32,
        /// Opcode value (two-byte forms carry the 0xFE prefix)
        code: u16,
    },

    /// Operand runs past the end of the body
    #[error("Truncated operand at IL_{offset:04X}")]
    TruncatedOperand {
        /// Instruction offset
        offset: u32,
    },

    /// Body too large for 16-bit offsets
    #[error("Method body of {0} bytes exceeds the maximum method size")]
    MethodTooLarge(usize),

    /// Body has no instructions
    #[error("Method body is empty")]
    EmptyBody,

    /// Branch target outside the body
    #[error("Branch at IL_{offset:04X} targets {target}, outside a body of {length} bytes")]
    BranchOutOfRange {
        /// Branch instruction offset
        offset: u32,
        /// Absolute target offset
        target: i64,
        /// Body length
        length: u32,
    },

    /// Branch target inside another instruction
    #[error("Branch at IL_{offset:04X} targets IL_{target:04X}, which is not an instruction boundary")]
    MisalignedTarget {
        /// Branch instruction offset
        offset: u32,
        /// Absolute target offset
        target: u32,
    },

    /// Last instruction falls through past the end
    #[error("Control falls off the end of the body at IL_{offset:04X}")]
    FallsOffEnd {
        /// Instruction offset
        offset: u32,
    },

    /// Exception clause outside the body
    #[error("Exception clause {index} references offset {offset} outside the body")]
    RegionOutOfRange {
        /// Clause index
        index: usize,
        /// Offending offset
        offset: u32,
    },

    /// Recomputed displacement does not fit its encoding
    #[error("Displacement {displacement} at IL_{offset:04X} does not fit the short branch form")]
    DisplacementOverflow {
        /// Instruction offset in the rebuilt body
        offset: u32,
        /// Recomputed displacement
        displacement: i64,
    },
}

/// Result type for bytecode operations
pub type BytecodeResult<T> = std::result::Result<T, TranslationError>;
