//! Compiled program and its upload encoding

use firmil_types::{ClassDeclaration, ExceptionRegion, MethodFlags, MethodKey, NativeMethod, Token};
use firmil_wire::{FlashHeader, Frame, MessageEncoder, SignatureKind, SlotDescriptor, WireResult};
use rustc_hash::FxHasher;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// One method ready for upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledMethod {
    /// Method as referenced by the program
    pub key: MethodKey,
    /// Session token
    pub token: Token,
    /// Declaration flags
    pub flags: MethodFlags,
    /// Evaluation stack depth
    pub max_stack: u8,
    /// Argument slots, receiver first
    pub arguments: Vec<SlotDescriptor>,
    /// Local slots
    pub locals: Vec<SlotDescriptor>,
    /// Firmware operation, for native methods
    pub native: Option<NativeMethod>,
    /// Pruned, token-patched IL
    pub code: Vec<u8>,
    /// Exception clauses over the pruned IL
    pub regions: Vec<ExceptionRegion>,
    /// Instructions removed as unreachable
    pub removed_instructions: usize,
}

impl CompiledMethod {
    /// Whether the firmware supplies the body
    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// Encode the declaration, signatures, body and clauses
    pub fn encode(&self, encoder: &mut MessageEncoder) -> WireResult<Vec<Frame>> {
        let arg_count = u8::try_from(self.arguments.len()).unwrap_or(u8::MAX);
        let mut frames = vec![encoder.declare_method(
            self.token,
            self.flags,
            self.max_stack,
            arg_count,
            self.native.unwrap_or(NativeMethod::None),
        )?];
        if !self.arguments.is_empty() {
            frames.extend(encoder.method_signature(self.token, SignatureKind::Arguments, &self.arguments)?);
        }
        if !self.locals.is_empty() {
            frames.extend(encoder.method_signature(self.token, SignatureKind::Locals, &self.locals)?);
        }
        if !self.is_native() {
            frames.extend(encoder.load_il(self.token, &self.code)?);
            frames.extend(encoder.exception_clauses(self.token, &self.regions)?);
        }
        Ok(frames)
    }
}

/// String or blob stored in device constant memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constant {
    /// Session token
    pub token: Token,
    /// Stored bytes
    pub data: Vec<u8>,
    /// Counted against string memory rather than constant memory
    pub is_string: bool,
}

/// Everything the device needs to run an entry point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledProgram {
    /// Entry method
    pub entry: MethodKey,
    /// Entry method token
    pub entry_token: Token,
    /// Methods in discovery order, entry first
    pub methods: Vec<CompiledMethod>,
    /// Classes in dependency order, parents first
    pub classes: Vec<ClassDeclaration>,
    /// Constant data
    pub constants: Vec<Constant>,
    /// Static constructors to run before the entry point
    pub type_initializers: Vec<Token>,
}

impl CompiledProgram {
    /// Method by token
    pub fn method(&self, token: Token) -> Option<&CompiledMethod> {
        self.methods.iter().find(|m| m.token == token)
    }

    /// Total IL bytes after pruning
    pub fn code_size(&self) -> usize {
        self.methods.iter().map(|m| m.code.len()).sum()
    }

    /// Instructions removed as unreachable across all methods
    pub fn removed_instructions(&self) -> usize {
        self.methods.iter().map(|m| m.removed_instructions).sum()
    }

    /// Bytes of constant and string memory the program needs
    pub fn constant_memory(&self) -> (u32, u32) {
        self.constants.iter().fold((0, 0), |(c, s), constant| {
            let len = constant.data.len() as u32;
            if constant.is_string { (c, s + len) } else { (c + len, s) }
        })
    }

    /// Stable fingerprint of the uploaded content
    pub fn hash(&self) -> u32 {
        let mut hasher = FxHasher::default();
        self.entry_token.hash(&mut hasher);
        for method in &self.methods {
            method.token.hash(&mut hasher);
            method.flags.to_bits().hash(&mut hasher);
            method.code.hash(&mut hasher);
        }
        for class in &self.classes {
            class.token.hash(&mut hasher);
            class.members.len().hash(&mut hasher);
        }
        for constant in &self.constants {
            constant.token.hash(&mut hasher);
            constant.data.hash(&mut hasher);
        }
        let full = hasher.finish();
        (full ^ (full >> 32)) as u32
    }

    /// Encode the upload: classes, methods, constants, then the optional flash commit
    pub fn to_frames(&self, encoder: &mut MessageEncoder, flash_version: Option<u32>) -> WireResult<Vec<Frame>> {
        let mut frames = Vec::new();
        for class in &self.classes {
            frames.extend(encoder.class_declaration(class)?);
        }
        for method in &self.methods {
            frames.extend(method.encode(encoder)?);
        }
        if !self.constants.is_empty() {
            let (constant_size, string_size) = self.constant_memory();
            frames.push(encoder.set_constant_memory_size(constant_size, string_size)?);
            for constant in &self.constants {
                frames.extend(encoder.constant_data(constant.token, &constant.data)?);
            }
        }
        if let Some(data_version) = flash_version {
            frames.push(encoder.copy_to_flash()?);
            frames.push(encoder.write_flash_header(&FlashHeader {
                data_version,
                hash: self.hash(),
                startup_token: self.entry_token,
                startup_flags: 0,
            })?);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmil_types::VariableKind;
    use firmil_wire::ExecutorCommand;

    fn program() -> CompiledProgram {
        let key = MethodKey::new("Demo.Program", "Main", Vec::new());
        CompiledProgram {
            entry: key.clone(),
            entry_token: Token::new(21),
            methods: vec![CompiledMethod {
                key,
                token: Token::new(21),
                flags: MethodFlags {
                    is_static: true,
                    is_void: true,
                    ..Default::default()
                },
                max_stack: 2,
                arguments: Vec::new(),
                locals: vec![SlotDescriptor::of(VariableKind::Int32)],
                native: None,
                code: vec![0x16, 0x0A, 0x2A],
                regions: Vec::new(),
                removed_instructions: 1,
            }],
            classes: Vec::new(),
            constants: vec![Constant {
                token: Token::new(22),
                data: "hi".encode_utf16().flat_map(u16::to_le_bytes).collect(),
                is_string: true,
            }],
            type_initializers: Vec::new(),
        }
    }

    #[test]
    fn test_upload_order() {
        let frames = program().to_frames(&mut MessageEncoder::default(), Some(3)).unwrap();
        let commands: Vec<_> = frames.iter().filter_map(Frame::command).collect();
        assert_eq!(
            commands,
            vec![
                ExecutorCommand::DeclareMethod,
                ExecutorCommand::MethodSignature,
                ExecutorCommand::LoadIl,
                ExecutorCommand::SetConstantMemorySize,
                ExecutorCommand::ConstantData,
                ExecutorCommand::CopyToFlash,
                ExecutorCommand::WriteFlashHeader,
            ]
        );
    }

    #[test]
    fn test_summary_figures() {
        let program = program();
        assert_eq!(program.code_size(), 3);
        assert_eq!(program.removed_instructions(), 1);
        assert_eq!(program.constant_memory(), (0, 4));
        assert_eq!(program.hash(), program.clone().hash());
        assert!(program.method(Token::new(21)).is_some());
    }
}
