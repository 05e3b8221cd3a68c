//! Call-graph walk from an entry point
//!
//! Starting at the entry method, every token in every reachable body is
//! resolved: methods are queued for compilation, types are declared as classes
//! (parents first), strings become constants. After the queue drains, virtual
//! overrides of compiled methods on declared classes are pulled in until
//! nothing new is found.

use firmil_bytecode::{ControlFlowGraph, Instruction};
use firmil_resolver::{Decision, Resolver, RuleSet, Target};
use firmil_types::{
    Assembly, ClassDeclaration, ClassMember, ClauseKind, MetadataRef, MethodDef, MethodFlags, MethodKey,
    NativeMethod, Token, TypeDef, VariableKind,
};
use firmil_wire::{Frame, MessageEncoder, SlotDescriptor};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::program::{CompiledMethod, CompiledProgram, Constant};

/// Longest chain of replacements followed for one reference
const MAX_REDIRECTS: usize = 8;

/// Compiles entry points of one assembly
pub struct Compiler<'a> {
    resolver: Resolver<'a>,
    config: CompilerConfig,
}

impl<'a> Compiler<'a> {
    /// Create a compiler with its own resolver
    pub fn new(assembly: &'a Assembly, rules: RuleSet, config: CompilerConfig) -> CompileResult<Self> {
        Ok(Self::with_resolver(Resolver::new(assembly, rules)?, config))
    }

    /// Create a compiler over an existing resolver and its token table
    pub fn with_resolver(resolver: Resolver<'a>, config: CompilerConfig) -> Self {
        Self { resolver, config }
    }

    /// Resolver in use
    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    /// Settings in use
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile the method named by a `Type::method` path
    pub fn compile_path(&self, path: &str) -> CompileResult<CompiledProgram> {
        let key = self
            .resolver
            .assembly()
            .find_method_by_path(path)
            .ok_or_else(|| CompileError::EntryNotFound(path.to_string()))?;
        self.compile(&key)
    }

    /// Compile everything reachable from `entry`
    pub fn compile(&self, entry: &MethodKey) -> CompileResult<CompiledProgram> {
        if self.resolver.assembly().find_method(entry).is_none() {
            return Err(CompileError::EntryNotFound(entry.to_string()));
        }
        let mut walk = Walk::new(self);
        let entry_token = walk.realize(entry)?;
        walk.run()?;
        let classes = walk.declare_classes()?;
        let program = CompiledProgram {
            entry: entry.clone(),
            entry_token,
            methods: walk.methods,
            classes,
            constants: walk.constants,
            type_initializers: walk.type_initializers,
        };
        info!(
            entry = %entry,
            methods = program.methods.len(),
            classes = program.classes.len(),
            code = program.code_size(),
            removed = program.removed_instructions(),
            "compiled program"
        );
        Ok(program)
    }

    /// Encode a program with this compiler's message size and flash settings
    pub fn encode(&self, program: &CompiledProgram) -> CompileResult<Vec<Frame>> {
        let mut encoder = MessageEncoder::new(self.config.max_message_size);
        let flash = self.config.write_to_flash.then_some(self.config.data_version);
        Ok(program.to_frames(&mut encoder, flash)?)
    }
}

/// State of one compilation
struct Walk<'c, 'a> {
    compiler: &'c Compiler<'a>,
    assembly: &'a Assembly,
    queue: VecDeque<MethodKey>,
    queued: FxHashSet<MethodKey>,
    requested: FxHashSet<MethodKey>,
    methods: Vec<CompiledMethod>,
    classes: Vec<String>,
    declared: FxHashSet<String>,
    constants: Vec<Constant>,
    constant_tokens: FxHashSet<Token>,
    type_initializers: Vec<Token>,
}

impl<'c, 'a> Walk<'c, 'a> {
    fn new(compiler: &'c Compiler<'a>) -> Self {
        Self {
            compiler,
            assembly: compiler.resolver.assembly(),
            queue: VecDeque::new(),
            queued: FxHashSet::default(),
            requested: FxHashSet::default(),
            methods: Vec::new(),
            classes: Vec::new(),
            declared: FxHashSet::default(),
            constants: Vec::new(),
            constant_tokens: FxHashSet::default(),
            type_initializers: Vec::new(),
        }
    }

    fn resolver(&self) -> &'c Resolver<'a> {
        &self.compiler.resolver
    }

    fn run(&mut self) -> CompileResult<()> {
        loop {
            while let Some(key) = self.queue.pop_front() {
                self.compile_method(key)?;
            }
            let overrides = self.pending_overrides();
            if overrides.is_empty() {
                return Ok(());
            }
            for key in overrides {
                self.realize(&key)?;
            }
        }
    }

    /// Follow replacements to the method actually compiled
    fn effective_key(&self, key: &MethodKey) -> CompileResult<MethodKey> {
        let mut current = key.clone();
        for _ in 0..MAX_REDIRECTS {
            match self.resolver().resolve_method(&current) {
                Decision::Reject(reason) => return Err(CompileError::rejected(&current, reason)),
                Decision::UseReimplementation(Target::Method(next)) if next != current => current = next,
                Decision::UseReimplementation(target) => {
                    return Err(CompileError::internal(format!("{current} resolved to {target}")));
                }
                Decision::UseOriginal | Decision::UseNativeOperation(_) => return Ok(current),
            }
        }
        Err(CompileError::unsupported(format!("replacements of {key} do not terminate")))
    }

    /// Token for a method reference; queues the method on first sight
    fn realize(&mut self, key: &MethodKey) -> CompileResult<Token> {
        self.requested.insert(key.clone());
        let effective = self.effective_key(key)?;
        let token = self.resolver().method_token(&effective);
        if self.queued.insert(effective.clone()) {
            self.queue.push_back(effective);
        }
        Ok(token)
    }

    fn realize_type(&mut self, name: &str) -> CompileResult<Token> {
        match self.resolver().resolve_type(name) {
            Decision::Reject(reason) => Err(CompileError::rejected(name, reason)),
            Decision::UseReimplementation(Target::Type(replacement)) => {
                self.declare(&replacement)?;
                Ok(self.resolver().type_token(&replacement))
            }
            _ => {
                self.declare(name.strip_suffix("[]").unwrap_or(name))?;
                Ok(self.resolver().type_token(name))
            }
        }
    }

    fn realize_field(&mut self, declaring_type: &str, name: &str) -> CompileResult<Token> {
        let owner = match self.resolver().resolve_type(declaring_type) {
            Decision::Reject(reason) => {
                return Err(CompileError::rejected(format!("{declaring_type}::{name}"), reason));
            }
            Decision::UseReimplementation(Target::Type(replacement)) => replacement,
            _ => declaring_type.to_string(),
        };
        self.declare(&owner)?;
        Ok(self.resolver().field_token(&owner, name))
    }

    fn realize_string(&mut self, value: &str) -> Token {
        let token = self.resolver().string_token(value);
        if self.constant_tokens.insert(token) {
            self.constants.push(Constant {
                token,
                data: value.encode_utf16().flat_map(u16::to_le_bytes).collect(),
                is_string: true,
            });
        }
        token
    }

    /// Register a described class, its parents first
    fn declare(&mut self, name: &str) -> CompileResult<()> {
        let Some(ty) = self.assembly.find_type(name) else {
            return Ok(());
        };
        if !self.declared.insert(name.to_string()) {
            return Ok(());
        }
        if let Some(parent) = &ty.parent {
            self.realize_type(parent)?;
        }
        self.classes.push(name.to_string());
        if self.compiler.config.include_type_initializers
            && let Some(cctor) = ty.methods.iter().find(|m| m.is_type_initializer())
        {
            let token = self.realize(&ty.method_key(cctor))?;
            self.type_initializers.push(token);
        }
        Ok(())
    }

    fn compile_method(&mut self, key: MethodKey) -> CompileResult<()> {
        let limit = self.compiler.config.max_methods;
        if self.methods.len() >= limit {
            return Err(CompileError::TooManyMethods(limit));
        }
        let token = self.resolver().method_token(&key);
        let compiled = match self.resolver().resolve_method(&key) {
            Decision::UseNativeOperation(native) => {
                let (ty, def) = self
                    .assembly
                    .find_method(&key)
                    .or_else(|| native_declaration(self.assembly, native))
                    .ok_or_else(|| {
                        CompileError::rejected(&key, format!("native operation {} has no declaration", native.name()))
                    })?;
                self.declare(&ty.name)?;
                self.native_method(key, token, ty, def, native)?
            }
            Decision::UseOriginal => {
                let (ty, def) = self
                    .assembly
                    .find_method(&key)
                    .ok_or_else(|| CompileError::internal(format!("{key} resolved without a definition")))?;
                self.declare(&ty.name)?;
                self.body_method(key, token, ty, def)?
            }
            other => return Err(CompileError::internal(format!("{key} queued as {other}"))),
        };
        self.methods.push(compiled);
        Ok(())
    }

    fn native_method(
        &self,
        key: MethodKey,
        token: Token,
        ty: &TypeDef,
        def: &MethodDef,
        native: NativeMethod,
    ) -> CompileResult<CompiledMethod> {
        let flags = flags_of(def, true);
        flags.validate()?;
        debug!(method = %key, token = %token, native = native.name(), "declared native method");
        Ok(CompiledMethod {
            arguments: argument_slots(self.assembly, ty, def),
            locals: Vec::new(),
            key,
            token,
            flags,
            max_stack: def.max_stack,
            native: Some(native),
            code: Vec::new(),
            regions: Vec::new(),
            removed_instructions: 0,
        })
    }

    fn body_method(
        &mut self,
        key: MethodKey,
        token: Token,
        ty: &TypeDef,
        def: &MethodDef,
    ) -> CompileResult<CompiledMethod> {
        if def.generic_arity > 0 {
            return Err(CompileError::unsupported(format!("generic method {key}")));
        }
        let flags = flags_of(def, false);
        flags.validate()?;

        let (code, regions, removed) = match &def.body {
            Some(body) => {
                let mut graph = ControlFlowGraph::build(body, &def.exception_clauses)
                    .map_err(|e| CompileError::from(e).in_method(&key))?;
                graph
                    .compute_reachability()
                    .map_err(|e| CompileError::from(e).in_method(&key))?;
                let emitted = graph
                    .emit(|instruction| self.patch_instruction(&key, instruction))
                    .map_err(|e| e.in_method(&key))?;
                let mut regions = emitted.regions;
                for region in &mut regions {
                    if region.kind == ClauseKind::Catch && region.class_or_filter != 0 {
                        region.class_or_filter = self.patch_catch_type(&key, region.class_or_filter)?.value();
                    }
                }
                (emitted.code, regions, emitted.removed)
            }
            None if def.is_abstract => (Vec::new(), Vec::new(), 0),
            None => return Err(CompileError::rejected(&key, "method has no body")),
        };

        debug!(method = %key, token = %token, bytes = code.len(), removed, "compiled method");
        Ok(CompiledMethod {
            arguments: argument_slots(self.assembly, ty, def),
            locals: def.locals.iter().map(|l| slot(self.assembly, &l.ty)).collect(),
            key,
            token,
            flags,
            max_stack: def.max_stack,
            native: None,
            code,
            regions,
            removed_instructions: removed,
        })
    }

    /// Session token for the IL token an instruction carries
    fn patch_instruction(&mut self, key: &MethodKey, instruction: &Instruction) -> CompileResult<Option<u32>> {
        let Some(il_token) = instruction.token() else {
            return Ok(None);
        };
        let entity = self
            .assembly
            .resolve_token(il_token)
            .ok_or_else(|| CompileError::UnresolvedToken {
                method: key.clone(),
                token: il_token,
            })?;
        let token = match entity {
            MetadataRef::Type { name } => self.realize_type(name)?,
            MetadataRef::Method { key: callee } => self.realize(callee)?,
            MetadataRef::Field { declaring_type, name } => self.realize_field(declaring_type, name)?,
            MetadataRef::String { value } => self.realize_string(value),
        };
        Ok(Some(token.value()))
    }

    fn patch_catch_type(&mut self, key: &MethodKey, il_token: u32) -> CompileResult<Token> {
        match self.assembly.resolve_token(il_token) {
            Some(MetadataRef::Type { name }) => self.realize_type(name),
            Some(other) => Err(CompileError::unsupported(format!("catch clause over {other:?} in {key}"))),
            None => Err(CompileError::UnresolvedToken {
                method: key.clone(),
                token: il_token,
            }),
        }
    }

    /// Virtual methods on declared classes overriding something the program calls
    fn pending_overrides(&self) -> Vec<MethodKey> {
        let mut pending = Vec::new();
        for name in &self.classes {
            let Some(ty) = self.assembly.find_type(name) else {
                continue;
            };
            for method in ty.methods.iter().filter(|m| m.is_virtual) {
                let key = ty.method_key(method);
                if self.requested.contains(&key) || self.queued.contains(&key) {
                    continue;
                }
                if method
                    .overrides
                    .iter()
                    .any(|base| self.requested.contains(base) || self.queued.contains(base))
                {
                    pending.push(key);
                }
            }
        }
        pending
    }

    fn declare_classes(&mut self) -> CompileResult<Vec<ClassDeclaration>> {
        let names = self.classes.clone();
        let mut declarations = Vec::with_capacity(names.len());
        for name in &names {
            let Some(ty) = self.assembly.find_type(name) else {
                continue;
            };
            let parent = match &ty.parent {
                Some(parent) => self.realize_type(parent)?,
                None => Token::NONE,
            };

            let mut members = Vec::with_capacity(ty.fields.len());
            for field in &ty.fields {
                let (kind, size) = self.assembly.layout_of(&field.ty);
                let token = self.resolver().field_token(name, &field.name);
                members.push(ClassMember::field(&field.name, kind, token, size, field.is_static));
            }
            for method in self.methods.iter().filter(|m| &m.key.declaring_type == name) {
                let bases = ty
                    .find_method(&method.key.name, &method.key.signature)
                    .map(|def| self.base_tokens(def))
                    .unwrap_or_default();
                members.push(ClassMember::method(&method.key.name, method.token, bases));
            }

            let interfaces = ty
                .interfaces
                .iter()
                .filter_map(|iface| match self.resolver().resolve_type(iface) {
                    Decision::Reject(reason) => {
                        debug!(class = %name, interface = %iface, reason = %reason, "interface left out");
                        None
                    }
                    Decision::UseReimplementation(Target::Type(replacement)) => {
                        Some(self.resolver().type_token(&replacement))
                    }
                    _ => Some(self.resolver().type_token(iface)),
                })
                .collect();

            declarations.push(ClassDeclaration {
                name: name.clone(),
                token: self.resolver().type_token(name),
                parent,
                dynamic_size: self.assembly.instance_size(name),
                static_size: self.assembly.static_size(name),
                is_value_type: ty.is_value_type,
                members,
                interfaces,
            });
        }
        Ok(declarations)
    }

    /// Tokens of the methods a method overrides, after replacement
    fn base_tokens(&self, def: &MethodDef) -> Vec<Token> {
        def.overrides
            .iter()
            .filter_map(|base| match self.effective_key(base) {
                Ok(effective) => Some(self.resolver().method_token(&effective)),
                Err(err) => {
                    debug!(base = %base, error = %err, "override base left out");
                    None
                }
            })
            .collect()
    }
}

fn flags_of(def: &MethodDef, is_native: bool) -> MethodFlags {
    MethodFlags {
        is_static: def.is_static,
        is_virtual: def.is_virtual,
        is_native,
        is_void: def.is_void(),
        is_ctor: def.is_ctor(),
        is_abstract: def.is_abstract,
        is_synchronized: def.is_synchronized,
    }
}

fn slot(assembly: &Assembly, type_name: &str) -> SlotDescriptor {
    let (kind, size) = assembly.layout_of(type_name);
    SlotDescriptor {
        kind,
        size: u32::from(size),
    }
}

fn argument_slots(assembly: &Assembly, ty: &TypeDef, def: &MethodDef) -> Vec<SlotDescriptor> {
    let receiver = (!def.is_static).then(|| {
        SlotDescriptor::of(if ty.is_value_type {
            VariableKind::Reference
        } else {
            VariableKind::Object
        })
    });
    receiver
        .into_iter()
        .chain(def.parameters.iter().map(|p| slot(assembly, &p.ty)))
        .collect()
}

/// Any method declared as the given firmware operation
fn native_declaration(assembly: &Assembly, native: NativeMethod) -> Option<(&TypeDef, &MethodDef)> {
    assembly.types.iter().find_map(|ty| {
        ty.methods
            .iter()
            .find(|m| m.native == Some(native))
            .map(|m| (ty, m))
    })
}
