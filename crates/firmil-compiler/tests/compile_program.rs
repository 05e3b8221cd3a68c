//! End-to-end Compilation Tests

use firmil_compiler::{CompileError, Compiler, CompilerConfig};
use firmil_resolver::{Rule, RuleSet};
use firmil_types::{Assembly, NativeMethod, Token};
use firmil_wire::{ExecutorCommand, FrameKind};

const MATH: &str = r#"{
    "name": "Math",
    "types": [
        {
            "name": "Demo.Program",
            "parent": "System.Object",
            "methods": [
                {
                    "name": "Main",
                    "is_static": true,
                    "body": [114, 1, 0, 0, 112,
                             40, 1, 0, 0, 10,
                             35, 0, 0, 0, 0, 0, 0, 16, 64,
                             40, 2, 0, 0, 10,
                             38, 42,
                             22, 42]
                },
                {
                    "name": "Log",
                    "is_static": true,
                    "parameters": [ { "name": "message", "type": "System.String" } ],
                    "body": [42]
                }
            ]
        },
        {
            "name": "Mini.MiniMath",
            "methods": [
                {
                    "name": "Sqrt",
                    "is_static": true,
                    "parameters": [ { "name": "d", "type": "System.Double" } ],
                    "return_type": "System.Double",
                    "native": "MathSqrt"
                }
            ]
        }
    ],
    "tokens": {
        "1879048193": { "ref": "string", "value": "hello" },
        "167772161": { "ref": "method", "declaring_type": "Demo.Program", "name": "Log", "signature": ["System.String"] },
        "167772162": { "ref": "method", "declaring_type": "System.Math", "name": "Sqrt", "signature": ["System.Double"] }
    }
}"#;

const SHAPES: &str = r#"{
    "name": "Shapes",
    "types": [
        {
            "name": "Demo.Program",
            "parent": "System.Object",
            "methods": [
                { "name": "Main", "is_static": true, "body": [115, 1, 0, 0, 10, 111, 2, 0, 0, 10, 38, 42] }
            ]
        },
        {
            "name": "Demo.Shape",
            "parent": "System.Object",
            "methods": [
                { "name": ".ctor", "body": [42] },
                { "name": "Area", "is_virtual": true, "return_type": "System.Int32", "body": [22, 42] }
            ]
        },
        {
            "name": "Demo.Square",
            "parent": "Demo.Shape",
            "fields": [
                { "name": "side", "type": "System.Int32" },
                { "name": "count", "type": "System.Int32", "is_static": true }
            ],
            "methods": [
                { "name": ".ctor", "body": [42] },
                {
                    "name": "Area",
                    "is_virtual": true,
                    "return_type": "System.Int32",
                    "overrides": [ { "declaring_type": "Demo.Shape", "name": "Area" } ],
                    "body": [23, 42]
                }
            ]
        }
    ],
    "tokens": {
        "167772161": { "ref": "method", "declaring_type": "Demo.Square", "name": ".ctor" },
        "167772162": { "ref": "method", "declaring_type": "Demo.Shape", "name": "Area" }
    }
}"#;

fn sqrt_rule() -> RuleSet {
    RuleSet::compile(vec![Rule::method("System.Math", "Sqrt", "Mini.MiniMath")]).unwrap()
}

fn token_at(code: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

#[test]
fn test_entry_compiles_with_patched_tokens() {
    let asm = Assembly::from_json(MATH).unwrap();
    let compiler = Compiler::new(&asm, sqrt_rule(), CompilerConfig::default()).unwrap();
    let program = compiler.compile_path("Demo.Program::Main").unwrap();

    let names: Vec<_> = program.methods.iter().map(|m| m.key.to_string()).collect();
    assert_eq!(
        names,
        vec![
            "Demo.Program::Main()",
            "Demo.Program::Log(System.String)",
            "System.Math::Sqrt(System.Double)",
        ]
    );

    let main = &program.methods[0];
    assert_eq!(main.token, program.entry_token);
    assert_eq!(main.removed_instructions, 2);
    assert_eq!(main.code.len(), 26);

    let string = token_at(&main.code, 1);
    let log = token_at(&main.code, 6);
    let sqrt = token_at(&main.code, 20);
    assert_eq!(program.constants.len(), 1);
    assert_eq!(program.constants[0].token, Token::new(string));
    assert_eq!(program.constants[0].data, vec![b'h', 0, b'e', 0, b'l', 0, b'l', 0, b'o', 0]);
    assert_eq!(program.methods[1].token, Token::new(log));

    let native = program.method(Token::new(sqrt)).unwrap();
    assert_eq!(native.native, Some(NativeMethod::MathSqrt));
    assert!(native.flags.is_native);
    assert!(native.code.is_empty());
}

#[test]
fn test_upload_frames_fit_the_link() {
    let asm = Assembly::from_json(MATH).unwrap();
    let compiler = Compiler::new(&asm, sqrt_rule(), CompilerConfig::default().max_message_size(40)).unwrap();
    let program = compiler.compile_path("Demo.Program::Main").unwrap();
    let frames = compiler.encode(&program).unwrap();

    assert!(!frames.is_empty());
    for frame in &frames {
        assert!(frame.len() <= 40);
        let bytes = frame.as_bytes();
        assert!(bytes[1..bytes.len() - 1].iter().all(|b| b & 0x80 == 0));
        assert!(matches!(frame.kind(), FrameKind::Il { .. }));
    }
    let commands: Vec<_> = frames.iter().filter_map(|f| f.command()).collect();
    let declared = commands
        .iter()
        .filter(|c| **c == ExecutorCommand::DeclareMethod)
        .count();
    assert_eq!(declared, 3);
    assert_eq!(commands.last(), Some(&ExecutorCommand::ConstantData));
}

#[test]
fn test_missing_rule_rejects() {
    let asm = Assembly::from_json(MATH).unwrap();
    let compiler = Compiler::new(&asm, RuleSet::default(), CompilerConfig::default()).unwrap();
    let err = compiler.compile_path("Demo.Program::Main").unwrap_err();
    assert!(matches!(&err, CompileError::Rejected { reference, .. } if reference.contains("System.Math::Sqrt")));
}

#[test]
fn test_unknown_entry() {
    let asm = Assembly::from_json(MATH).unwrap();
    let compiler = Compiler::new(&asm, sqrt_rule(), CompilerConfig::default()).unwrap();
    assert!(matches!(
        compiler.compile_path("Demo.Program::Missing"),
        Err(CompileError::EntryNotFound(_))
    ));
}

#[test]
fn test_unresolved_token() {
    let mut asm = Assembly::from_json(MATH).unwrap();
    asm.tokens.remove(&0x0A00_0001);
    let compiler = Compiler::new(&asm, sqrt_rule(), CompilerConfig::default()).unwrap();
    assert!(matches!(
        compiler.compile_path("Demo.Program::Main"),
        Err(CompileError::UnresolvedToken { token: 0x0A00_0001, .. })
    ));
}

#[test]
fn test_branch_outside_body_is_attributed() {
    let mut asm = Assembly::from_json(MATH).unwrap();
    asm.types[0].methods[1].body = Some(vec![0x2B, 0x40, 0x2A]);
    let compiler = Compiler::new(&asm, sqrt_rule(), CompilerConfig::default()).unwrap();
    let err = compiler.compile_path("Demo.Program::Main").unwrap_err();
    assert!(matches!(&err, CompileError::Translation { method, .. } if method.name == "Log"));
}

#[test]
fn test_overrides_follow_virtual_calls() {
    let asm = Assembly::from_json(SHAPES).unwrap();
    let compiler = Compiler::new(&asm, RuleSet::default(), CompilerConfig::default()).unwrap();
    let program = compiler.compile_path("Demo.Program::Main").unwrap();

    let classes: Vec<_> = program.classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(classes, vec!["Demo.Program", "Demo.Shape", "Demo.Square"]);

    let base = program
        .methods
        .iter()
        .find(|m| m.key.declaring_type == "Demo.Shape" && m.key.name == "Area")
        .unwrap();
    let square = &program.classes[2];
    assert_eq!(square.parent, program.classes[1].token);
    assert_eq!(square.static_size, 4);
    let area = square
        .members
        .iter()
        .find(|m| m.name == "Area")
        .expect("override compiled");
    assert_eq!(
        area.detail,
        firmil_types::MemberDetail::Method {
            base_tokens: vec![base.token]
        }
    );
}
