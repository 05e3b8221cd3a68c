//! Subtype relation over an assembly's declared types

use firmil_types::Assembly;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Parent and interface edges of every declared type
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    parents: FxHashMap<String, String>,
    interfaces: FxHashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    /// Collect the edges declared by an assembly
    pub fn from_assembly(assembly: &Assembly) -> Self {
        let mut hierarchy = Self::default();
        for ty in &assembly.types {
            if let Some(parent) = &ty.parent {
                hierarchy.add_parent(&ty.name, parent);
            }
            for iface in &ty.interfaces {
                hierarchy.add_interface(&ty.name, iface);
            }
        }
        hierarchy
    }

    /// Record `child : parent`
    pub fn add_parent(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.parents.insert(child.into(), parent.into());
    }

    /// Record that `ty` implements `iface`
    pub fn add_interface(&mut self, ty: impl Into<String>, iface: impl Into<String>) {
        self.interfaces.entry(ty.into()).or_default().push(iface.into());
    }

    /// Declared parent of a type
    pub fn parent(&self, ty: &str) -> Option<&str> {
        self.parents.get(ty).map(String::as_str)
    }

    /// Whether `ty` is `ancestor` or derives from it through parents or interfaces
    pub fn is_subtype_of(&self, ty: &str, ancestor: &str) -> bool {
        if ty == ancestor {
            return true;
        }
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([ty]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if current == ancestor {
                return true;
            }
            if let Some(parent) = self.parents.get(current) {
                queue.push_back(parent.as_str());
            }
            if let Some(ifaces) = self.interfaces.get(current) {
                queue.extend(ifaces.iter().map(String::as_str));
            }
        }
        false
    }

    /// Parent chain from the immediate parent upwards
    pub fn ancestors(&self, ty: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(ty);
        let mut current = ty;
        while let Some(parent) = self.parents.get(current) {
            if !seen.insert(parent.as_str()) {
                break;
            }
            chain.push(parent.as_str());
            current = parent;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exceptions() -> TypeHierarchy {
        let mut h = TypeHierarchy::default();
        h.add_parent("System.Exception", "System.Object");
        h.add_parent("System.SystemException", "System.Exception");
        h.add_parent("System.ArgumentException", "System.SystemException");
        h.add_parent("System.ArgumentNullException", "System.ArgumentException");
        h.add_interface("System.Exception", "System.Runtime.Serialization.ISerializable");
        h
    }

    #[test]
    fn test_subtype_through_parents() {
        let h = exceptions();
        assert!(h.is_subtype_of("System.ArgumentNullException", "System.Exception"));
        assert!(h.is_subtype_of("System.Exception", "System.Exception"));
        assert!(!h.is_subtype_of("System.Exception", "System.ArgumentException"));
        assert!(h.is_subtype_of(
            "System.ArgumentException",
            "System.Runtime.Serialization.ISerializable"
        ));
    }

    #[test]
    fn test_ancestors() {
        let h = exceptions();
        assert_eq!(
            h.ancestors("System.ArgumentException"),
            vec!["System.SystemException", "System.Exception", "System.Object"]
        );
    }

    #[test]
    fn test_cycles_terminate() {
        let mut h = TypeHierarchy::default();
        h.add_parent("A", "B");
        h.add_parent("B", "A");
        assert!(!h.is_subtype_of("A", "C"));
        assert_eq!(h.ancestors("A"), vec!["B"]);
    }
}
