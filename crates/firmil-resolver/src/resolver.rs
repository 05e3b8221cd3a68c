//! Substitution resolver
//!
//! Rule classes are tried in a fixed order and the first one that produces a
//! decision wins:
//!
//! 1. method rules on the declaring type
//! 2. whole-type rules
//! 3. whole-type rules propagated to subclasses
//! 4. parameter-name shims
//!
//! With no rule the original is used when it can run on the device and rejected
//! otherwise. Every decision is memoised for the session.

use firmil_types::{Assembly, KnownTypeToken, MetadataRef, MethodDef, MethodKey, Token, TypeDef, VariableKind};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use crate::decision::{Decision, Target};
use crate::error::{ResolveError, ResolveResult};
use crate::hierarchy::TypeHierarchy;
use crate::rules::{Rule, RulePriority, RuleSet};
use crate::tokens::TokenTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoKey {
    Method(MethodKey),
    Type(String),
}

/// Outcome of trying one rule
enum RuleMatch {
    Decided(Decision),
    NotApplicable,
}

/// Resolves references against one assembly and rule table
pub struct Resolver<'a> {
    assembly: &'a Assembly,
    rules: RuleSet,
    hierarchy: TypeHierarchy,
    tokens: Arc<TokenTable>,
    memo: Mutex<FxHashMap<MemoKey, Decision>>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with a fresh token table
    pub fn new(assembly: &'a Assembly, rules: RuleSet) -> ResolveResult<Self> {
        Self::with_tokens(assembly, rules, Arc::new(TokenTable::new()))
    }

    /// Create a resolver sharing an existing token table
    pub fn with_tokens(assembly: &'a Assembly, rules: RuleSet, tokens: Arc<TokenTable>) -> ResolveResult<Self> {
        for (index, rule) in rules.indexed() {
            let Some(replacement) = assembly.find_type(&rule.replacement) else {
                return Err(ResolveError::invalid_rule(
                    index,
                    format!("replacement type {} is not described", rule.replacement),
                ));
            };
            if let Some(method) = &rule.replacement_method
                && !replacement.methods.iter().any(|m| &m.name == method)
            {
                return Err(ResolveError::invalid_rule(
                    index,
                    format!("{} has no method {method}", rule.replacement),
                ));
            }
        }
        Ok(Self {
            assembly,
            rules,
            hierarchy: TypeHierarchy::from_assembly(assembly),
            tokens,
            memo: Mutex::new(FxHashMap::default()),
        })
    }

    /// Assembly being resolved against
    pub fn assembly(&self) -> &'a Assembly {
        self.assembly
    }

    /// Subtype relation of the assembly
    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// Session token table
    pub fn tokens(&self) -> &Arc<TokenTable> {
        &self.tokens
    }

    /// Token of a type
    pub fn type_token(&self, name: &str) -> Token {
        self.tokens.get_or_assign(&MetadataRef::Type { name: name.to_string() })
    }

    /// Token of a method
    pub fn method_token(&self, key: &MethodKey) -> Token {
        self.tokens.get_or_assign(&MetadataRef::Method { key: key.clone() })
    }

    /// Token of a field
    pub fn field_token(&self, declaring_type: &str, name: &str) -> Token {
        self.tokens.get_or_assign(&MetadataRef::Field {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
        })
    }

    /// Token of a string constant
    pub fn string_token(&self, value: &str) -> Token {
        self.tokens.get_or_assign(&MetadataRef::String {
            value: value.to_string(),
        })
    }

    /// Token of any entity
    pub fn token_of(&self, entity: &MetadataRef) -> Token {
        self.tokens.get_or_assign(entity)
    }

    /// Decide how a method is realized
    pub fn resolve_method(&self, key: &MethodKey) -> Decision {
        let memo_key = MemoKey::Method(key.clone());
        if let Some(decision) = self.memo.lock().get(&memo_key) {
            return decision.clone();
        }
        let decision = self.decide_method(key);
        debug!(method = %key, decision = %decision, "resolved");
        // A racing resolution of the same key computed the same decision
        self.memo.lock().entry(memo_key).or_insert(decision).clone()
    }

    /// Decide how a type is realized
    pub fn resolve_type(&self, name: &str) -> Decision {
        let memo_key = MemoKey::Type(name.to_string());
        if let Some(decision) = self.memo.lock().get(&memo_key) {
            return decision.clone();
        }
        let decision = self.decide_type(name);
        debug!(ty = name, decision = %decision, "resolved");
        self.memo.lock().entry(memo_key).or_insert(decision).clone()
    }

    /// Forget memoised decisions and tokens
    pub fn reset(&self) {
        self.memo.lock().clear();
        self.tokens.reset();
    }

    fn decide_method(&self, key: &MethodKey) -> Decision {
        let original = self.assembly.find_method(key).map(|(_, m)| m);

        for rule in self.rules.of(RulePriority::Method) {
            if rule.original == key.declaring_type
                && rule.method.as_deref() == Some(key.name.as_str())
                && let RuleMatch::Decided(d) = self.apply_member_rule(rule, key, original, true)
            {
                return d;
            }
        }
        for rule in self.rules.of(RulePriority::Type) {
            if rule.original == key.declaring_type
                && let RuleMatch::Decided(d) = self.apply_member_rule(rule, key, original, rule.replace_entire_type)
            {
                return d;
            }
        }
        for rule in self.rules.of(RulePriority::Hierarchy) {
            if self.hierarchy.is_subtype_of(&key.declaring_type, &rule.original)
                && let RuleMatch::Decided(d) = self.apply_member_rule(rule, key, original, rule.replace_entire_type)
            {
                return d;
            }
        }
        for rule in self.rules.of(RulePriority::ParameterNames) {
            if let RuleMatch::Decided(d) = self.apply_shim_rule(rule, key, original) {
                return d;
            }
        }

        let Some(original) = original else {
            return Decision::reject(format!("{key} is not described and no rule replaces it"));
        };
        if let Some(native) = original.native {
            return Decision::UseNativeOperation(native);
        }
        if let Some(service) = original.requires_services.first() {
            return Decision::reject(format!("{key} depends on unsupported runtime service {service}"));
        }
        if original.body.is_none() && !original.is_abstract {
            return Decision::reject(format!("{key} has no body"));
        }
        Decision::UseOriginal
    }

    fn decide_type(&self, name: &str) -> Decision {
        for rule in self
            .rules
            .of(RulePriority::Type)
            .filter(|r| r.original == name)
            .chain(
                self.rules
                    .of(RulePriority::Hierarchy)
                    .filter(|r| self.hierarchy.is_subtype_of(name, &r.original)),
            )
        {
            if rule.replace_entire_type {
                return Decision::UseReimplementation(Target::Type(rule.replacement.clone()));
            }
        }
        let element = name.strip_suffix("[]").unwrap_or(name);
        if self.assembly.find_type(element).is_some()
            || VariableKind::for_primitive(element).is_some()
            || KnownTypeToken::from_type_name(element).is_some()
        {
            return Decision::UseOriginal;
        }
        Decision::reject(format!("type {name} is not described and no rule replaces it"))
    }

    /// Look up the replacing member for a method or type rule
    fn apply_member_rule(
        &self,
        rule: &Rule,
        key: &MethodKey,
        original: Option<&MethodDef>,
        required: bool,
    ) -> RuleMatch {
        let Some(replacement) = self.assembly.find_type(&rule.replacement) else {
            return RuleMatch::Decided(Decision::reject(format!(
                "replacement type {} is not described",
                rule.replacement
            )));
        };
        let name = rule.replacement_method.as_deref().unwrap_or(&key.name);
        let is_static = original.map(|m| m.is_static);
        match self.find_compatible(replacement, name, key, is_static) {
            Some(method) => RuleMatch::Decided(reimplementation(replacement, method)),
            None if required => RuleMatch::Decided(Decision::reject(format!(
                "{} does not provide {key}",
                rule.replacement
            ))),
            None => RuleMatch::NotApplicable,
        }
    }

    /// Match a free function whose parameter names equal the original's
    fn apply_shim_rule(&self, rule: &Rule, key: &MethodKey, original: Option<&MethodDef>) -> RuleMatch {
        let applies_to_type = if rule.include_subclasses {
            self.hierarchy.is_subtype_of(&key.declaring_type, &rule.original)
        } else {
            rule.original == key.declaring_type
        };
        if !applies_to_type || rule.method.as_deref().is_some_and(|m| m != key.name) {
            return RuleMatch::NotApplicable;
        }
        let names = rule.parameter_names.as_deref().unwrap_or_default();
        if let Some(original) = original
            && !original.parameter_names().eq(names.iter().map(String::as_str))
        {
            return RuleMatch::NotApplicable;
        }
        let Some(replacement) = self.assembly.find_type(&rule.replacement) else {
            return RuleMatch::NotApplicable;
        };
        let name = rule.replacement_method.as_deref().unwrap_or(&key.name);
        let receiver = usize::from(original.is_some_and(|m| !m.is_static));
        let shim = replacement.methods.iter().find(|m| {
            m.name == name
                && m.is_static
                && m.parameters.len() == names.len() + receiver
                && m.parameter_names().skip(receiver).eq(names.iter().map(String::as_str))
        });
        match shim {
            Some(method) => RuleMatch::Decided(reimplementation(replacement, method)),
            None if rule.replace_entire_type => RuleMatch::Decided(Decision::reject(format!(
                "{} has no shim for {key}",
                rule.replacement
            ))),
            None => RuleMatch::NotApplicable,
        }
    }

    /// Same signature, or a static method taking the receiver first
    fn find_compatible<'t>(
        &self,
        replacement: &'t TypeDef,
        name: &str,
        key: &MethodKey,
        original_is_static: Option<bool>,
    ) -> Option<&'t MethodDef> {
        let exact = replacement
            .methods
            .iter()
            .find(|m| m.name == name && m.signature() == key.signature);
        if exact.is_some() || original_is_static == Some(true) {
            return exact;
        }
        replacement.methods.iter().find(|m| {
            let Some((receiver, rest)) = m.parameters.split_first() else {
                return false;
            };
            m.name == name
                && m.is_static
                && rest.len() == key.signature.len()
                && rest.iter().zip(&key.signature).all(|(p, ty)| &p.ty == ty)
                && (receiver.ty == "System.Object" || self.hierarchy.is_subtype_of(&key.declaring_type, &receiver.ty))
        })
    }
}

fn reimplementation(replacement: &TypeDef, method: &MethodDef) -> Decision {
    match method.native {
        Some(native) => Decision::UseNativeOperation(native),
        None => Decision::UseReimplementation(Target::Method(replacement.method_key(method))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use firmil_types::{NativeMethod, Parameter};

    fn method(name: &str, params: &[(&str, &str)], is_static: bool) -> MethodDef {
        MethodDef {
            name: name.into(),
            parameters: params
                .iter()
                .map(|(n, t)| Parameter {
                    name: (*n).into(),
                    ty: (*t).into(),
                })
                .collect(),
            return_type: "System.Void".into(),
            is_static,
            is_virtual: false,
            is_abstract: false,
            is_synchronized: false,
            generic_arity: 0,
            max_stack: 8,
            locals: Vec::new(),
            body: Some(vec![0x2A]),
            exception_clauses: Vec::new(),
            overrides: Vec::new(),
            requires_services: Vec::new(),
            native: None,
        }
    }

    fn ty(name: &str, parent: Option<&str>, methods: Vec<MethodDef>) -> TypeDef {
        TypeDef {
            name: name.into(),
            parent: parent.map(Into::into),
            is_value_type: false,
            is_interface: false,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods,
        }
    }

    fn assembly() -> Assembly {
        let mut sqrt = method("Sqrt", &[("d", "System.Double")], true);
        sqrt.native = Some(NativeMethod::MathSqrt);
        let mut culture = method("ToUpper", &[], false);
        culture.requires_services = vec!["globalization".into()];
        Assembly {
            name: "Demo".into(),
            types: vec![
                ty(
                    "System.Math",
                    None,
                    vec![method("Sqrt", &[("d", "System.Double")], true), method("Abs", &[("value", "System.Int32")], true)],
                ),
                ty("Mini.MiniMath", None, vec![sqrt]),
                ty("Demo.Text", None, vec![culture, method("Trim", &[], false)]),
                ty("Mini.MiniText", None, vec![method("Trim", &[("self", "Demo.Text")], true)]),
                ty("System.Exception", None, vec![method("get_Message", &[], false)]),
                ty("Demo.IoException", Some("System.Exception"), vec![method("get_Message", &[], false)]),
                ty("Mini.MiniException", None, vec![method("get_Message", &[], false)]),
                ty(
                    "Demo.Buffer",
                    None,
                    vec![method("Fill", &[("target", "System.Object"), ("value", "System.Byte")], false)],
                ),
                ty(
                    "Mini.BufferShims",
                    None,
                    vec![method(
                        "Fill",
                        &[("this", "Demo.Buffer"), ("target", "System.Object"), ("value", "System.Byte")],
                        true,
                    )],
                ),
            ],
            tokens: Default::default(),
        }
    }

    fn key(ty: &str, name: &str, sig: &[&str]) -> MethodKey {
        MethodKey::new(ty, name, sig.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_method_rule_resolves_native() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::method("System.Math", "Sqrt", "Mini.MiniMath")]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        let decision = resolver.resolve_method(&key("System.Math", "Sqrt", &["System.Double"]));
        assert_eq!(decision, Decision::UseNativeOperation(NativeMethod::MathSqrt));
        assert_eq!(decision.native_id(), Some(90));
    }

    #[test]
    fn test_method_rule_without_member_rejects() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::method("System.Math", "Abs", "Mini.MiniMath")]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        assert!(resolver.resolve_method(&key("System.Math", "Abs", &["System.Int32"])).is_reject());
    }

    #[test]
    fn test_partial_type_rule_falls_through() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::whole_type("System.Math", "Mini.MiniMath")]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        assert_eq!(
            resolver.resolve_method(&key("System.Math", "Abs", &["System.Int32"])),
            Decision::UseOriginal
        );
    }

    #[test]
    fn test_replace_entire_type_rejects_missing_member() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::whole_type("System.Math", "Mini.MiniMath").entire()]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        let abs = key("System.Math", "Abs", &["System.Int32"]);
        assert!(resolver.resolve_method(&abs).is_reject());
        assert_eq!(
            resolver.resolve_type("System.Math"),
            Decision::UseReimplementation(Target::Type("Mini.MiniMath".into()))
        );
    }

    #[test]
    fn test_static_receiver_shim() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::whole_type("Demo.Text", "Mini.MiniText")]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        assert_eq!(
            resolver.resolve_method(&key("Demo.Text", "Trim", &[])),
            Decision::UseReimplementation(Target::Method(key("Mini.MiniText", "Trim", &["Demo.Text"])))
        );
    }

    #[test]
    fn test_subclass_rule_applies_to_derived_type() {
        let asm = assembly();
        let rules =
            RuleSet::compile(vec![Rule::whole_type("System.Exception", "Mini.MiniException").entire().with_subclasses()])
                .unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        assert_eq!(
            resolver.resolve_method(&key("Demo.IoException", "get_Message", &[])),
            Decision::UseReimplementation(Target::Method(key("Mini.MiniException", "get_Message", &[])))
        );
    }

    #[test]
    fn test_parameter_name_shim() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![
            Rule::whole_type("Demo.Buffer", "Mini.BufferShims").with_parameter_names(["target", "value"]),
        ])
        .unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        let fill = key("Demo.Buffer", "Fill", &["System.Object", "System.Byte"]);
        assert!(matches!(
            resolver.resolve_method(&fill),
            Decision::UseReimplementation(Target::Method(k)) if k.declaring_type == "Mini.BufferShims"
        ));
    }

    #[test]
    fn test_fallback_rules() {
        let asm = assembly();
        let resolver = Resolver::new(&asm, RuleSet::default()).unwrap();
        assert_eq!(resolver.resolve_method(&key("Demo.Text", "Trim", &[])), Decision::UseOriginal);
        assert!(resolver.resolve_method(&key("Demo.Text", "ToUpper", &[])).is_reject());
        assert!(resolver.resolve_method(&key("Demo.Missing", "Run", &[])).is_reject());
        assert_eq!(
            resolver.resolve_method(&key("Mini.MiniMath", "Sqrt", &["System.Double"])),
            Decision::UseNativeOperation(NativeMethod::MathSqrt)
        );
        assert_eq!(resolver.resolve_type("System.Int32[]"), Decision::UseOriginal);
        assert!(resolver.resolve_type("System.Globalization.CultureInfo").is_reject());
    }

    #[test]
    fn test_resolution_is_memoised() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::whole_type("Demo.Text", "Mini.MiniText")]).unwrap();
        let resolver = Resolver::new(&asm, rules).unwrap();
        let trim = key("Demo.Text", "Trim", &[]);
        let first = resolver.resolve_method(&trim);
        let token = resolver.method_token(&trim);
        assert_eq!(resolver.resolve_method(&trim), first);
        assert_eq!(resolver.method_token(&trim), token);
    }

    #[test]
    fn test_unknown_replacement_type_is_invalid() {
        let asm = assembly();
        let rules = RuleSet::compile(vec![Rule::whole_type("Demo.Text", "Mini.Nowhere")]).unwrap();
        assert!(matches!(
            Resolver::new(&asm, rules),
            Err(ResolveError::InvalidRule { index: 0, .. })
        ));
    }
}
