//! Decoded instructions

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::MAX_METHOD_SIZE;
use crate::error::{BytecodeResult, TranslationError};
use crate::opcode::{Opcode, OperandType};

/// Inline operand value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No operand
    None,
    /// Integer immediate (8, 32 or 64 bits)
    Int(i64),
    /// Float immediate (stored widened)
    Float(f64),
    /// Local or argument index
    Var(u16),
    /// Relative branch displacement
    Branch(i32),
    /// Relative switch displacements
    Switch(Vec<i32>),
    /// Metadata token
    Token(u32),
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Byte offset from the start of the body
    pub offset: u32,
    /// Opcode
    pub opcode: Opcode,
    /// Inline operand
    pub operand: Operand,
    /// Encoded length including operand
    pub length: u32,
}

impl Instruction {
    /// Offset of the following instruction; displacements are relative to it
    #[inline]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.length
    }

    /// Absolute branch targets; may lie outside the body
    pub fn branch_targets(&self) -> SmallVec<[i64; 2]> {
        let base = i64::from(self.next_offset());
        match &self.operand {
            Operand::Branch(rel) => SmallVec::from_slice(&[base + i64::from(*rel)]),
            Operand::Switch(rels) => rels.iter().map(|rel| base + i64::from(*rel)).collect(),
            _ => SmallVec::new(),
        }
    }

    /// Metadata token carried by the instruction
    pub fn token(&self) -> Option<u32> {
        match self.operand {
            Operand::Token(t) => Some(t),
            _ => None,
        }
    }

    /// Encode with replacement targets and token
    ///
    /// `targets` are displacements relative to the next instruction in the
    /// rebuilt body, in operand order.
    pub(crate) fn encode(
        &self,
        out: &mut Vec<u8>,
        targets: &[i64],
        token: Option<u32>,
    ) -> BytecodeResult<()> {
        let at = out.len() as u32;
        self.opcode.write(out);
        match (&self.operand, self.opcode.operand_type()) {
            (Operand::None, _) => {}
            (Operand::Int(v), OperandType::ShortInlineI) => out.push(*v as i8 as u8),
            (Operand::Int(v), OperandType::InlineI8) => out.extend_from_slice(&v.to_le_bytes()),
            (Operand::Int(v), _) => out.extend_from_slice(&(*v as i32).to_le_bytes()),
            (Operand::Float(v), OperandType::ShortInlineR) => {
                out.extend_from_slice(&(*v as f32).to_le_bytes())
            }
            (Operand::Float(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Operand::Var(v), OperandType::ShortInlineVar) => out.push(*v as u8),
            (Operand::Var(v), _) => out.extend_from_slice(&v.to_le_bytes()),
            (Operand::Branch(_), OperandType::ShortInlineBrTarget) => {
                let rel = targets.first().copied().unwrap_or(0);
                let short = i8::try_from(rel).map_err(|_| TranslationError::DisplacementOverflow {
                    offset: at,
                    displacement: rel,
                })?;
                out.push(short as u8);
            }
            (Operand::Branch(_), _) => {
                let rel = wide_displacement(at, targets.first().copied().unwrap_or(0))?;
                out.extend_from_slice(&rel.to_le_bytes());
            }
            (Operand::Switch(rels), _) => {
                out.extend_from_slice(&(rels.len() as u32).to_le_bytes());
                for rel in targets.iter().take(rels.len()) {
                    out.extend_from_slice(&wide_displacement(at, *rel)?.to_le_bytes());
                }
            }
            (Operand::Token(original), _) => {
                out.extend_from_slice(&token.unwrap_or(*original).to_le_bytes())
            }
        }
        Ok(())
    }
}

fn wide_displacement(offset: u32, rel: i64) -> BytecodeResult<i32> {
    i32::try_from(rel).map_err(|_| TranslationError::DisplacementOverflow {
        offset,
        displacement: rel,
    })
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(v) => write!(f, " {}", v),
            Operand::Float(v) => write!(f, " {}", v),
            Operand::Var(v) => write!(f, " V_{}", v),
            Operand::Branch(_) | Operand::Switch(_) => {
                let targets: Vec<String> = self
                    .branch_targets()
                    .iter()
                    .map(|t| format!("IL_{:04X}", t))
                    .collect();
                write!(f, " {}", targets.join(", "))
            }
            Operand::Token(t) => write!(f, " 0x{:08X}", t),
        }
    }
}

struct Reader<'a> {
    code: &'a [u8],
    pos: usize,
    offset: u32,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> BytecodeResult<[u8; N]> {
        let bytes = self
            .code
            .get(self.pos..self.pos + N)
            .ok_or(TranslationError::TruncatedOperand { offset: self.offset })?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        self.pos += N;
        Ok(buf)
    }

    fn i32(&mut self) -> BytecodeResult<i32> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }
}

/// Decode a whole method body in program-counter order
pub fn decode_method(code: &[u8]) -> BytecodeResult<Vec<Instruction>> {
    if code.len() >= MAX_METHOD_SIZE {
        return Err(TranslationError::MethodTooLarge(code.len()));
    }
    if code.is_empty() {
        return Err(TranslationError::EmptyBody);
    }

    let mut instructions = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let (opcode, opcode_len) = Opcode::read(code, pc)?;
        let mut reader = Reader {
            code,
            pos: pc + opcode_len,
            offset: pc as u32,
        };
        let operand = match opcode.operand_type() {
            OperandType::InlineNone => Operand::None,
            OperandType::ShortInlineI => Operand::Int(i64::from(reader.take::<1>()?[0] as i8)),
            OperandType::InlineI => Operand::Int(i64::from(reader.i32()?)),
            OperandType::InlineI8 => Operand::Int(i64::from_le_bytes(reader.take::<8>()?)),
            OperandType::ShortInlineR => {
                Operand::Float(f64::from(f32::from_le_bytes(reader.take::<4>()?)))
            }
            OperandType::InlineR => Operand::Float(f64::from_le_bytes(reader.take::<8>()?)),
            OperandType::ShortInlineVar => Operand::Var(u16::from(reader.take::<1>()?[0])),
            OperandType::InlineVar => Operand::Var(u16::from_le_bytes(reader.take::<2>()?)),
            OperandType::ShortInlineBrTarget => {
                Operand::Branch(i32::from(reader.take::<1>()?[0] as i8))
            }
            OperandType::InlineBrTarget => Operand::Branch(reader.i32()?),
            OperandType::InlineSwitch => {
                let count = u32::from_le_bytes(reader.take::<4>()?) as usize;
                if count > code.len() / 4 {
                    return Err(TranslationError::TruncatedOperand { offset: pc as u32 });
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(reader.i32()?);
                }
                Operand::Switch(targets)
            }
            _ => Operand::Token(u32::from_le_bytes(reader.take::<4>()?)),
        };
        let length = (reader.pos - pc) as u32;
        instructions.push(Instruction {
            offset: pc as u32,
            opcode,
            operand,
            length,
        });
        pc = reader.pos;
    }
    Ok(instructions)
}
