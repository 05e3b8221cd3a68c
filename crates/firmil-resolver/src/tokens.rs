//! Session token table
//!
//! Tokens are handed out once per entity and never change until [`TokenTable::reset`].
//! Lookups share a read lock; assignment takes the write lock and checks again
//! before allocating, so two compilations racing on the same new entity agree on
//! one token.

use firmil_types::{KnownTypeToken, MetadataRef, Token};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

#[derive(Debug)]
struct Inner {
    forward: FxHashMap<MetadataRef, Token>,
    inverse: FxHashMap<Token, MetadataRef>,
    next: u32,
}

impl Inner {
    fn seeded() -> Self {
        let mut inner = Self {
            forward: FxHashMap::default(),
            inverse: FxHashMap::default(),
            next: Token::FIRST_DYNAMIC.value(),
        };
        for known in KnownTypeToken::ALL {
            let entity = MetadataRef::Type {
                name: known.type_name().to_string(),
            };
            inner.forward.insert(entity.clone(), known.token());
            inner.inverse.insert(known.token(), entity);
        }
        inner
    }
}

/// Append-only bijection between entities and tokens
#[derive(Debug)]
pub struct TokenTable {
    inner: RwLock<Inner>,
}

impl Default for TokenTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTable {
    /// Table holding only the well-known types
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::seeded()),
        }
    }

    /// Token already assigned to an entity
    pub fn get(&self, entity: &MetadataRef) -> Option<Token> {
        self.inner.read().forward.get(entity).copied()
    }

    /// Token of an entity, assigning the next free one on first sight
    pub fn get_or_assign(&self, entity: &MetadataRef) -> Token {
        if let Some(token) = self.get(entity) {
            return token;
        }
        let mut inner = self.inner.write();
        if let Some(token) = inner.forward.get(entity) {
            return *token;
        }
        let token = Token::new(inner.next);
        inner.next += 1;
        inner.forward.insert(entity.clone(), token);
        inner.inverse.insert(token, entity.clone());
        trace!(token = %token, entity = ?entity, "token assigned");
        token
    }

    /// Entity a token was assigned to
    pub fn entity(&self, token: Token) -> Option<MetadataRef> {
        self.inner.read().inverse.get(&token).cloned()
    }

    /// Number of bound tokens, well-known types included
    pub fn len(&self) -> usize {
        self.inner.read().forward.len()
    }

    /// Whether only the well-known types are bound
    pub fn is_empty(&self) -> bool {
        self.len() == KnownTypeToken::ALL.len()
    }

    /// Forget every dynamic token; the next assignment starts over at the first dynamic token
    pub fn reset(&self) {
        *self.inner.write() = Inner::seeded();
    }

    /// All bindings ordered by token
    pub fn snapshot(&self) -> Vec<(Token, MetadataRef)> {
        let inner = self.inner.read();
        let mut all: Vec<_> = inner.inverse.iter().map(|(t, e)| (*t, e.clone())).collect();
        all.sort_by_key(|(t, _)| *t);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> MetadataRef {
        MetadataRef::Type { name: name.into() }
    }

    #[test]
    fn test_known_types_prebound() {
        let table = TokenTable::new();
        assert_eq!(table.get(&ty("System.String")), Some(KnownTypeToken::String.token()));
        assert!(table.is_empty());
        assert_eq!(table.get_or_assign(&ty("System.Object")), Token::new(1));
        assert!(table.is_empty());
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let table = TokenTable::new();
        let a = table.get_or_assign(&ty("Demo.A"));
        let b = table.get_or_assign(&ty("Demo.B"));
        assert_eq!(a, Token::FIRST_DYNAMIC);
        assert_eq!(b, Token::new(22));
        assert_eq!(table.get_or_assign(&ty("Demo.A")), a);
        assert_eq!(table.entity(b), Some(ty("Demo.B")));
    }

    #[test]
    fn test_reset_invalidates() {
        let table = TokenTable::new();
        let s = MetadataRef::String { value: "hi".into() };
        table.get_or_assign(&ty("Demo.A"));
        table.get_or_assign(&s);
        table.reset();
        assert_eq!(table.get(&s), None);
        assert_eq!(table.get_or_assign(&s), Token::FIRST_DYNAMIC);
        assert_eq!(table.snapshot().last(), Some(&(Token::FIRST_DYNAMIC, s)));
    }
}
