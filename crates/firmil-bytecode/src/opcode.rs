//! CIL opcode table
//!
//! Single-byte opcodes use their byte value; two-byte opcodes are stored as
//! `0xFE00 | second_byte`.

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeResult, TranslationError};

/// Inline operand following an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandType {
    /// No operand
    InlineNone,
    /// Signed 8-bit immediate
    ShortInlineI,
    /// 32-bit immediate
    InlineI,
    /// 64-bit immediate
    InlineI8,
    /// 32-bit float immediate
    ShortInlineR,
    /// 64-bit float immediate
    InlineR,
    /// 8-bit local or argument index
    ShortInlineVar,
    /// 16-bit local or argument index
    InlineVar,
    /// 8-bit relative branch
    ShortInlineBrTarget,
    /// 32-bit relative branch
    InlineBrTarget,
    /// Count followed by 32-bit relative targets
    InlineSwitch,
    /// Method token
    InlineMethod,
    /// Field token
    InlineField,
    /// Type token
    InlineType,
    /// Type, method or field token
    InlineTok,
    /// String token
    InlineString,
    /// Signature token
    InlineSig,
}

impl OperandType {
    /// Fixed operand size; switch tables add four bytes per target
    pub const fn size(self) -> usize {
        match self {
            Self::InlineNone => 0,
            Self::ShortInlineI | Self::ShortInlineVar | Self::ShortInlineBrTarget => 1,
            Self::InlineVar => 2,
            Self::InlineI8 | Self::InlineR => 8,
            Self::InlineI
            | Self::ShortInlineR
            | Self::InlineBrTarget
            | Self::InlineSwitch
            | Self::InlineMethod
            | Self::InlineField
            | Self::InlineType
            | Self::InlineTok
            | Self::InlineString
            | Self::InlineSig => 4,
        }
    }

    /// Whether the operand is a metadata token
    pub const fn is_token(self) -> bool {
        matches!(
            self,
            Self::InlineMethod
                | Self::InlineField
                | Self::InlineType
                | Self::InlineTok
                | Self::InlineString
                | Self::InlineSig
        )
    }
}

/// How control leaves an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowControl {
    /// Falls through
    Next,
    /// Unconditional branch, no fallthrough
    Branch,
    /// Branches or falls through
    CondBranch,
    /// Call, then falls through
    Call,
    /// Leaves the method or handler
    Return,
    /// Raises an exception, no fallthrough
    Throw,
    /// Debugger break, falls through
    Break,
    /// Prefix applying to the next instruction
    Meta,
}

impl FlowControl {
    /// Whether execution can continue with the next instruction
    pub const fn falls_through(self) -> bool {
        !matches!(self, Self::Branch | Self::Return | Self::Throw)
    }

    /// Whether the instruction carries explicit targets
    pub const fn has_targets(self) -> bool {
        matches!(self, Self::Branch | Self::CondBranch)
    }
}

macro_rules! opcodes {
    ($($name:ident = $code:literal, $text:literal, $operand:ident, $flow:ident;)*) => {
        /// CIL instruction opcode
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum Opcode {
            $($name = $code,)*
        }

        impl Opcode {
            /// Look up an opcode value
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the assembler mnemonic
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => $text,)*
                }
            }

            /// Inline operand kind
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $(Self::$name => OperandType::$operand,)*
                }
            }

            /// Control flow behaviour
            pub const fn flow(self) -> FlowControl {
                match self {
                    $(Self::$name => FlowControl::$flow,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", InlineNone, Next;
    Break = 0x01, "break", InlineNone, Break;
    Ldarg0 = 0x02, "ldarg.0", InlineNone, Next;
    Ldarg1 = 0x03, "ldarg.1", InlineNone, Next;
    Ldarg2 = 0x04, "ldarg.2", InlineNone, Next;
    Ldarg3 = 0x05, "ldarg.3", InlineNone, Next;
    Ldloc0 = 0x06, "ldloc.0", InlineNone, Next;
    Ldloc1 = 0x07, "ldloc.1", InlineNone, Next;
    Ldloc2 = 0x08, "ldloc.2", InlineNone, Next;
    Ldloc3 = 0x09, "ldloc.3", InlineNone, Next;
    Stloc0 = 0x0A, "stloc.0", InlineNone, Next;
    Stloc1 = 0x0B, "stloc.1", InlineNone, Next;
    Stloc2 = 0x0C, "stloc.2", InlineNone, Next;
    Stloc3 = 0x0D, "stloc.3", InlineNone, Next;
    LdargS = 0x0E, "ldarg.s", ShortInlineVar, Next;
    LdargaS = 0x0F, "ldarga.s", ShortInlineVar, Next;
    StargS = 0x10, "starg.s", ShortInlineVar, Next;
    LdlocS = 0x11, "ldloc.s", ShortInlineVar, Next;
    LdlocaS = 0x12, "ldloca.s", ShortInlineVar, Next;
    StlocS = 0x13, "stloc.s", ShortInlineVar, Next;
    Ldnull = 0x14, "ldnull", InlineNone, Next;
    LdcI4M1 = 0x15, "ldc.i4.m1", InlineNone, Next;
    LdcI40 = 0x16, "ldc.i4.0", InlineNone, Next;
    LdcI41 = 0x17, "ldc.i4.1", InlineNone, Next;
    LdcI42 = 0x18, "ldc.i4.2", InlineNone, Next;
    LdcI43 = 0x19, "ldc.i4.3", InlineNone, Next;
    LdcI44 = 0x1A, "ldc.i4.4", InlineNone, Next;
    LdcI45 = 0x1B, "ldc.i4.5", InlineNone, Next;
    LdcI46 = 0x1C, "ldc.i4.6", InlineNone, Next;
    LdcI47 = 0x1D, "ldc.i4.7", InlineNone, Next;
    LdcI48 = 0x1E, "ldc.i4.8", InlineNone, Next;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInlineI, Next;
    LdcI4 = 0x20, "ldc.i4", InlineI, Next;
    LdcI8 = 0x21, "ldc.i8", InlineI8, Next;
    LdcR4 = 0x22, "ldc.r4", ShortInlineR, Next;
    LdcR8 = 0x23, "ldc.r8", InlineR, Next;
    Dup = 0x25, "dup", InlineNone, Next;
    Pop = 0x26, "pop", InlineNone, Next;
    Jmp = 0x27, "jmp", InlineMethod, Call;
    Call = 0x28, "call", InlineMethod, Call;
    Calli = 0x29, "calli", InlineSig, Call;
    Ret = 0x2A, "ret", InlineNone, Return;
    BrS = 0x2B, "br.s", ShortInlineBrTarget, Branch;
    BrfalseS = 0x2C, "brfalse.s", ShortInlineBrTarget, CondBranch;
    BrtrueS = 0x2D, "brtrue.s", ShortInlineBrTarget, CondBranch;
    BeqS = 0x2E, "beq.s", ShortInlineBrTarget, CondBranch;
    BgeS = 0x2F, "bge.s", ShortInlineBrTarget, CondBranch;
    BgtS = 0x30, "bgt.s", ShortInlineBrTarget, CondBranch;
    BleS = 0x31, "ble.s", ShortInlineBrTarget, CondBranch;
    BltS = 0x32, "blt.s", ShortInlineBrTarget, CondBranch;
    BneUnS = 0x33, "bne.un.s", ShortInlineBrTarget, CondBranch;
    BgeUnS = 0x34, "bge.un.s", ShortInlineBrTarget, CondBranch;
    BgtUnS = 0x35, "bgt.un.s", ShortInlineBrTarget, CondBranch;
    BleUnS = 0x36, "ble.un.s", ShortInlineBrTarget, CondBranch;
    BltUnS = 0x37, "blt.un.s", ShortInlineBrTarget, CondBranch;
    Br = 0x38, "br", InlineBrTarget, Branch;
    Brfalse = 0x39, "brfalse", InlineBrTarget, CondBranch;
    Brtrue = 0x3A, "brtrue", InlineBrTarget, CondBranch;
    Beq = 0x3B, "beq", InlineBrTarget, CondBranch;
    Bge = 0x3C, "bge", InlineBrTarget, CondBranch;
    Bgt = 0x3D, "bgt", InlineBrTarget, CondBranch;
    Ble = 0x3E, "ble", InlineBrTarget, CondBranch;
    Blt = 0x3F, "blt", InlineBrTarget, CondBranch;
    BneUn = 0x40, "bne.un", InlineBrTarget, CondBranch;
    BgeUn = 0x41, "bge.un", InlineBrTarget, CondBranch;
    BgtUn = 0x42, "bgt.un", InlineBrTarget, CondBranch;
    BleUn = 0x43, "ble.un", InlineBrTarget, CondBranch;
    BltUn = 0x44, "blt.un", InlineBrTarget, CondBranch;
    Switch = 0x45, "switch", InlineSwitch, CondBranch;
    LdindI1 = 0x46, "ldind.i1", InlineNone, Next;
    LdindU1 = 0x47, "ldind.u1", InlineNone, Next;
    LdindI2 = 0x48, "ldind.i2", InlineNone, Next;
    LdindU2 = 0x49, "ldind.u2", InlineNone, Next;
    LdindI4 = 0x4A, "ldind.i4", InlineNone, Next;
    LdindU4 = 0x4B, "ldind.u4", InlineNone, Next;
    LdindI8 = 0x4C, "ldind.i8", InlineNone, Next;
    LdindI = 0x4D, "ldind.i", InlineNone, Next;
    LdindR4 = 0x4E, "ldind.r4", InlineNone, Next;
    LdindR8 = 0x4F, "ldind.r8", InlineNone, Next;
    LdindRef = 0x50, "ldind.ref", InlineNone, Next;
    StindRef = 0x51, "stind.ref", InlineNone, Next;
    StindI1 = 0x52, "stind.i1", InlineNone, Next;
    StindI2 = 0x53, "stind.i2", InlineNone, Next;
    StindI4 = 0x54, "stind.i4", InlineNone, Next;
    StindI8 = 0x55, "stind.i8", InlineNone, Next;
    StindR4 = 0x56, "stind.r4", InlineNone, Next;
    StindR8 = 0x57, "stind.r8", InlineNone, Next;
    Add = 0x58, "add", InlineNone, Next;
    Sub = 0x59, "sub", InlineNone, Next;
    Mul = 0x5A, "mul", InlineNone, Next;
    Div = 0x5B, "div", InlineNone, Next;
    DivUn = 0x5C, "div.un", InlineNone, Next;
    Rem = 0x5D, "rem", InlineNone, Next;
    RemUn = 0x5E, "rem.un", InlineNone, Next;
    And = 0x5F, "and", InlineNone, Next;
    Or = 0x60, "or", InlineNone, Next;
    Xor = 0x61, "xor", InlineNone, Next;
    Shl = 0x62, "shl", InlineNone, Next;
    Shr = 0x63, "shr", InlineNone, Next;
    ShrUn = 0x64, "shr.un", InlineNone, Next;
    Neg = 0x65, "neg", InlineNone, Next;
    Not = 0x66, "not", InlineNone, Next;
    ConvI1 = 0x67, "conv.i1", InlineNone, Next;
    ConvI2 = 0x68, "conv.i2", InlineNone, Next;
    ConvI4 = 0x69, "conv.i4", InlineNone, Next;
    ConvI8 = 0x6A, "conv.i8", InlineNone, Next;
    ConvR4 = 0x6B, "conv.r4", InlineNone, Next;
    ConvR8 = 0x6C, "conv.r8", InlineNone, Next;
    ConvU4 = 0x6D, "conv.u4", InlineNone, Next;
    ConvU8 = 0x6E, "conv.u8", InlineNone, Next;
    Callvirt = 0x6F, "callvirt", InlineMethod, Call;
    Cpobj = 0x70, "cpobj", InlineType, Next;
    Ldobj = 0x71, "ldobj", InlineType, Next;
    Ldstr = 0x72, "ldstr", InlineString, Next;
    Newobj = 0x73, "newobj", InlineMethod, Call;
    Castclass = 0x74, "castclass", InlineType, Next;
    Isinst = 0x75, "isinst", InlineType, Next;
    ConvRUn = 0x76, "conv.r.un", InlineNone, Next;
    Unbox = 0x79, "unbox", InlineType, Next;
    Throw = 0x7A, "throw", InlineNone, Throw;
    Ldfld = 0x7B, "ldfld", InlineField, Next;
    Ldflda = 0x7C, "ldflda", InlineField, Next;
    Stfld = 0x7D, "stfld", InlineField, Next;
    Ldsfld = 0x7E, "ldsfld", InlineField, Next;
    Ldsflda = 0x7F, "ldsflda", InlineField, Next;
    Stsfld = 0x80, "stsfld", InlineField, Next;
    Stobj = 0x81, "stobj", InlineType, Next;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", InlineNone, Next;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", InlineNone, Next;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", InlineNone, Next;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", InlineNone, Next;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", InlineNone, Next;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", InlineNone, Next;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", InlineNone, Next;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", InlineNone, Next;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", InlineNone, Next;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", InlineNone, Next;
    Box = 0x8C, "box", InlineType, Next;
    Newarr = 0x8D, "newarr", InlineType, Next;
    Ldlen = 0x8E, "ldlen", InlineNone, Next;
    Ldelema = 0x8F, "ldelema", InlineType, Next;
    LdelemI1 = 0x90, "ldelem.i1", InlineNone, Next;
    LdelemU1 = 0x91, "ldelem.u1", InlineNone, Next;
    LdelemI2 = 0x92, "ldelem.i2", InlineNone, Next;
    LdelemU2 = 0x93, "ldelem.u2", InlineNone, Next;
    LdelemI4 = 0x94, "ldelem.i4", InlineNone, Next;
    LdelemU4 = 0x95, "ldelem.u4", InlineNone, Next;
    LdelemI8 = 0x96, "ldelem.i8", InlineNone, Next;
    LdelemI = 0x97, "ldelem.i", InlineNone, Next;
    LdelemR4 = 0x98, "ldelem.r4", InlineNone, Next;
    LdelemR8 = 0x99, "ldelem.r8", InlineNone, Next;
    LdelemRef = 0x9A, "ldelem.ref", InlineNone, Next;
    StelemI = 0x9B, "stelem.i", InlineNone, Next;
    StelemI1 = 0x9C, "stelem.i1", InlineNone, Next;
    StelemI2 = 0x9D, "stelem.i2", InlineNone, Next;
    StelemI4 = 0x9E, "stelem.i4", InlineNone, Next;
    StelemI8 = 0x9F, "stelem.i8", InlineNone, Next;
    StelemR4 = 0xA0, "stelem.r4", InlineNone, Next;
    StelemR8 = 0xA1, "stelem.r8", InlineNone, Next;
    StelemRef = 0xA2, "stelem.ref", InlineNone, Next;
    Ldelem = 0xA3, "ldelem", InlineType, Next;
    Stelem = 0xA4, "stelem", InlineType, Next;
    UnboxAny = 0xA5, "unbox.any", InlineType, Next;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", InlineNone, Next;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", InlineNone, Next;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", InlineNone, Next;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", InlineNone, Next;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", InlineNone, Next;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", InlineNone, Next;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", InlineNone, Next;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", InlineNone, Next;
    Refanyval = 0xC2, "refanyval", InlineType, Next;
    Ckfinite = 0xC3, "ckfinite", InlineNone, Next;
    Mkrefany = 0xC6, "mkrefany", InlineType, Next;
    Ldtoken = 0xD0, "ldtoken", InlineTok, Next;
    ConvU2 = 0xD1, "conv.u2", InlineNone, Next;
    ConvU1 = 0xD2, "conv.u1", InlineNone, Next;
    ConvI = 0xD3, "conv.i", InlineNone, Next;
    ConvOvfI = 0xD4, "conv.ovf.i", InlineNone, Next;
    ConvOvfU = 0xD5, "conv.ovf.u", InlineNone, Next;
    AddOvf = 0xD6, "add.ovf", InlineNone, Next;
    AddOvfUn = 0xD7, "add.ovf.un", InlineNone, Next;
    MulOvf = 0xD8, "mul.ovf", InlineNone, Next;
    MulOvfUn = 0xD9, "mul.ovf.un", InlineNone, Next;
    SubOvf = 0xDA, "sub.ovf", InlineNone, Next;
    SubOvfUn = 0xDB, "sub.ovf.un", InlineNone, Next;
    Endfinally = 0xDC, "endfinally", InlineNone, Return;
    Leave = 0xDD, "leave", InlineBrTarget, Branch;
    LeaveS = 0xDE, "leave.s", ShortInlineBrTarget, Branch;
    StindI = 0xDF, "stind.i", InlineNone, Next;
    ConvU = 0xE0, "conv.u", InlineNone, Next;
    Arglist = 0xFE00, "arglist", InlineNone, Next;
    Ceq = 0xFE01, "ceq", InlineNone, Next;
    Cgt = 0xFE02, "cgt", InlineNone, Next;
    CgtUn = 0xFE03, "cgt.un", InlineNone, Next;
    Clt = 0xFE04, "clt", InlineNone, Next;
    CltUn = 0xFE05, "clt.un", InlineNone, Next;
    Ldftn = 0xFE06, "ldftn", InlineMethod, Next;
    Ldvirtftn = 0xFE07, "ldvirtftn", InlineMethod, Next;
    Ldarg = 0xFE09, "ldarg", InlineVar, Next;
    Ldarga = 0xFE0A, "ldarga", InlineVar, Next;
    Starg = 0xFE0B, "starg", InlineVar, Next;
    Ldloc = 0xFE0C, "ldloc", InlineVar, Next;
    Ldloca = 0xFE0D, "ldloca", InlineVar, Next;
    Stloc = 0xFE0E, "stloc", InlineVar, Next;
    Localloc = 0xFE0F, "localloc", InlineNone, Next;
    Endfilter = 0xFE11, "endfilter", InlineNone, Return;
    Unaligned = 0xFE12, "unaligned.", ShortInlineI, Meta;
    Volatile = 0xFE13, "volatile.", InlineNone, Meta;
    Tail = 0xFE14, "tail.", InlineNone, Meta;
    Initobj = 0xFE15, "initobj", InlineType, Next;
    Constrained = 0xFE16, "constrained.", InlineType, Meta;
    Cpblk = 0xFE17, "cpblk", InlineNone, Next;
    Initblk = 0xFE18, "initblk", InlineNone, Next;
    No = 0xFE19, "no.", ShortInlineI, Meta;
    Rethrow = 0xFE1A, "rethrow", InlineNone, Throw;
    Sizeof = 0xFE1C, "sizeof", InlineType, Next;
    Refanytype = 0xFE1D, "refanytype", InlineNone, Next;
    Readonly = 0xFE1E, "readonly.", InlineNone, Meta;
}

impl Opcode {
    /// Prefix byte introducing two-byte opcodes
    pub const PREFIX: u8 = 0xFE;

    /// Numeric opcode value
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Encoded opcode length in bytes
    #[inline]
    pub const fn size(self) -> usize {
        if (self as u16) > 0xFF { 2 } else { 1 }
    }

    /// Read an opcode at `pc`, returning it with its encoded length
    pub fn read(code: &[u8], pc: usize) -> BytecodeResult<(Self, usize)> {
        let offset = pc as u32;
        let first = *code.get(pc).ok_or(TranslationError::TruncatedOperand { offset })?;
        let (value, len) = if first == Self::PREFIX {
            let second = *code
                .get(pc + 1)
                .ok_or(TranslationError::TruncatedOperand { offset })?;
            ((u16::from(first) << 8) | u16::from(second), 2)
        } else {
            (u16::from(first), 1)
        };
        Self::from_code(value)
            .map(|op| (op, len))
            .ok_or(TranslationError::UnknownOpcode { offset, code: value })
    }

    /// Write the opcode bytes
    pub fn write(self, out: &mut Vec<u8>) {
        let code = self.code();
        if code > 0xFF {
            out.push((code >> 8) as u8);
        }
        out.push((code & 0xFF) as u8);
    }

    /// Whether this is an unconditional, conditional or switch branch
    pub const fn is_branch(self) -> bool {
        self.flow().has_targets()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
