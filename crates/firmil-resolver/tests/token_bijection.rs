//! Token Bijection Tests

use firmil_resolver::TokenTable;
use firmil_types::{MetadataRef, MethodKey, Token};
use proptest::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn entity(kind: u8, name: &str) -> MetadataRef {
    match kind % 4 {
        0 => MetadataRef::Type { name: name.into() },
        1 => MetadataRef::Method {
            key: MethodKey::new("Demo.T", name, Vec::new()),
        },
        2 => MetadataRef::Field {
            declaring_type: "Demo.T".into(),
            name: name.into(),
        },
        _ => MetadataRef::String { value: name.into() },
    }
}

#[test]
fn test_concurrent_assignment_agrees() {
    let table = Arc::new(TokenTable::new());
    let names: Vec<MetadataRef> = (0..64).map(|i| entity(i, &format!("e{i}"))).collect();

    let handles: Vec<_> = (0..8)
        .map(|shift| {
            let table = Arc::clone(&table);
            let names = names.clone();
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(names.len());
                for i in 0..names.len() {
                    let e = &names[(i + shift * 7) % names.len()];
                    seen.push((e.clone(), table.get_or_assign(e)));
                }
                seen
            })
        })
        .collect();

    let mut agreed: FxHashMap<MetadataRef, Token> = FxHashMap::default();
    for handle in handles {
        for (e, token) in handle.join().unwrap() {
            let previous = agreed.entry(e).or_insert(token);
            assert_eq!(*previous, token);
        }
    }
    let distinct: HashSet<Token> = agreed.values().copied().collect();
    assert_eq!(distinct.len(), names.len());
    assert!(distinct.iter().all(|t| t.value() >= Token::FIRST_DYNAMIC.value()));
}

proptest! {
    #[test]
    fn prop_tokens_are_a_bijection(entries in prop::collection::vec((any::<u8>(), "[a-z]{1,6}"), 1..64)) {
        let table = TokenTable::new();
        let mut assigned: FxHashMap<MetadataRef, Token> = FxHashMap::default();
        for (kind, name) in &entries {
            let e = entity(*kind, name);
            let token = table.get_or_assign(&e);
            if let Some(previous) = assigned.insert(e.clone(), token) {
                prop_assert_eq!(previous, token);
            }
            prop_assert_eq!(table.entity(token), Some(e));
        }
        let distinct: HashSet<Token> = assigned.values().copied().collect();
        prop_assert_eq!(distinct.len(), assigned.len());
    }
}
