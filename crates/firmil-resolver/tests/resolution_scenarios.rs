//! Resolution Scenario Tests

use firmil_resolver::{Decision, Resolver, RuleSet, Target};
use firmil_types::{Assembly, MethodKey};

const ASSEMBLY: &str = r#"{
    "name": "Scenarios",
    "types": [
        { "name": "System.Exception", "parent": "System.Object",
          "methods": [ { "name": "get_Message", "return_type": "System.String", "body": [2, 123, 1, 0, 0, 4, 42] } ] },
        { "name": "System.InvalidOperationException", "parent": "System.Exception",
          "methods": [ { "name": ".ctor", "body": [42] } ] },
        { "name": "Demo.DeviceFault", "parent": "System.InvalidOperationException",
          "methods": [ { "name": "get_Message", "return_type": "System.String", "requires_services": ["resources"] } ] },
        { "name": "Mini.Exception",
          "methods": [
              { "name": "get_Message", "return_type": "System.String", "body": [20, 42] },
              { "name": ".ctor", "body": [42] }
          ] },
        { "name": "Demo.Clock",
          "methods": [
              { "name": "Now", "is_static": true, "return_type": "System.Int64", "requires_services": ["time zone"] },
              { "name": "Ticks", "is_static": true, "return_type": "System.Int64", "body": [22, 106, 42] }
          ] },
        { "name": "Mini.Clock",
          "methods": [
              { "name": "Now", "is_static": true, "return_type": "System.Int64", "native": "InteropQueryPerformanceCounter" }
          ] }
    ]
}"#;

const RULES: &str = r#"
[[rules]]
original = "System.Exception"
replacement = "Mini.Exception"
replace_entire_type = true
include_subclasses = true

[[rules]]
original = "Demo.Clock"
replacement = "Mini.Clock"
"#;

fn key(ty: &str, name: &str) -> MethodKey {
    MethodKey::new(ty, name, Vec::new())
}

#[test]
fn test_subclass_of_replaced_type_is_reimplemented() {
    let asm = Assembly::from_json(ASSEMBLY).unwrap();
    let resolver = Resolver::new(&asm, RuleSet::from_toml(RULES).unwrap()).unwrap();

    let decision = resolver.resolve_method(&key("Demo.DeviceFault", "get_Message"));
    assert_eq!(
        decision,
        Decision::UseReimplementation(Target::Method(key("Mini.Exception", "get_Message")))
    );
    assert_eq!(
        resolver.resolve_type("Demo.DeviceFault"),
        Decision::UseReimplementation(Target::Type("Mini.Exception".into()))
    );
}

#[test]
fn test_partial_type_rule_keeps_unreplaced_members() {
    let asm = Assembly::from_json(ASSEMBLY).unwrap();
    let resolver = Resolver::new(&asm, RuleSet::from_toml(RULES).unwrap()).unwrap();

    assert_eq!(
        resolver.resolve_method(&key("Demo.Clock", "Now")).native_id(),
        Some(60)
    );
    assert_eq!(resolver.resolve_method(&key("Demo.Clock", "Ticks")), Decision::UseOriginal);
}

#[test]
fn test_without_rules_service_dependency_rejects() {
    let asm = Assembly::from_json(ASSEMBLY).unwrap();
    let resolver = Resolver::new(&asm, RuleSet::default()).unwrap();

    let Decision::Reject(reason) = resolver.resolve_method(&key("Demo.Clock", "Now")) else {
        panic!("expected a rejection");
    };
    assert!(reason.contains("time zone"));
}

#[test]
fn test_decisions_repeat_across_calls() {
    let asm = Assembly::from_json(ASSEMBLY).unwrap();
    let resolver = Resolver::new(&asm, RuleSet::from_toml(RULES).unwrap()).unwrap();
    let keys = [
        key("Demo.DeviceFault", "get_Message"),
        key("System.InvalidOperationException", ".ctor"),
        key("Demo.Clock", "Ticks"),
        key("Demo.Nowhere", "Run"),
    ];
    let first: Vec<_> = keys.iter().map(|k| resolver.resolve_method(k)).collect();
    let second: Vec<_> = keys.iter().map(|k| resolver.resolve_method(k)).collect();
    assert_eq!(first, second);
    assert!(first[3].is_reject());
}
