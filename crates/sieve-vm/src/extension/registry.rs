//! Extension registry
//!
//! Maps capability names to [`ExtId`]s and resolves object references.
//! The registry is built once and then shared read-only by compilers and
//! interpreters.

use super::{ExtId, ExtensionDef};
use crate::objects::{core_object, Object, ObjectClass, ObjRef};
use sieve_binary::ExtensionCheck;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    extensions: Vec<&'static ExtensionDef>,
    by_name: HashMap<&'static str, ExtId>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    /// Registry holding every built-in extension
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for def in crate::extensions::BUILTIN.iter().copied() {
            registry.register(def);
        }
        registry
    }

    /// Registry without any extension
    pub fn empty() -> Self {
        Self {
            extensions: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register an extension; registering a name twice returns the first id
    pub fn register(&mut self, def: &'static ExtensionDef) -> ExtId {
        if let Some(id) = self.by_name.get(def.name) {
            return *id;
        }
        let id = ExtId(self.extensions.len());
        self.extensions.push(def);
        self.by_name.insert(def.name, id);
        tracing::trace!(extension = def.name, id = id.0, "registered extension");
        id
    }

    pub fn get(&self, id: ExtId) -> Option<&'static ExtensionDef> {
        self.extensions.get(id.0).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<ExtId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExtId, &'static ExtensionDef)> + '_ {
        self.extensions
            .iter()
            .enumerate()
            .map(|(i, def)| (ExtId(i), *def))
    }

    /// Extensions loaded without `require`
    pub fn implicit(&self) -> impl Iterator<Item = ExtId> + '_ {
        self.iter()
            .filter(|(_, def)| def.implicit)
            .map(|(id, _)| id)
    }

    /// Resolve an object reference
    pub fn object(&self, class: ObjectClass, obj: ObjRef) -> Option<Object> {
        let found = match obj.ext {
            None => core_object(class, obj.code),
            Some(ext) => (self.get(ext)?.objects)(class, obj.code),
        };
        found.filter(|o| o.class() == class)
    }
}

impl ExtensionCheck for ExtensionRegistry {
    fn is_available(&self, name: &str, version: u32) -> bool {
        self.lookup(name)
            .and_then(|id| self.get(id))
            .is_some_and(|def| def.version == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CUSTOM: ExtensionDef = ExtensionDef {
        name: "vnd.test.custom",
        version: 3,
        ..ExtensionDef::EMPTY
    };

    #[test]
    fn test_builtins_registered() {
        let registry = ExtensionRegistry::new();
        for name in [
            "fileinto",
            "envelope",
            "copy",
            "regex",
            "relational",
            "subaddress",
            "variables",
            "editheader",
            "comparator-i;octet",
            "comparator-i;ascii-casemap",
            "comparator-i;ascii-numeric",
            "comparator-i;unicode-casemap",
        ] {
            assert!(registry.lookup(name).is_some(), "{} missing", name);
        }
        let implicit: Vec<_> = registry
            .implicit()
            .filter_map(|id| registry.get(id))
            .map(|def| def.name)
            .collect();
        assert_eq!(implicit, vec!["comparator-i;octet", "comparator-i;ascii-casemap"]);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ExtensionRegistry::empty();
        let a = registry.register(&CUSTOM);
        let b = registry.register(&CUSTOM);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_extension_check_compares_versions() {
        let mut registry = ExtensionRegistry::empty();
        registry.register(&CUSTOM);
        assert!(registry.is_available("vnd.test.custom", 3));
        assert!(!registry.is_available("vnd.test.custom", 2));
        assert!(!registry.is_available("fileinto", 1));
    }

    #[test]
    fn test_object_lookup() {
        let registry = ExtensionRegistry::new();
        let numeric = registry.lookup("comparator-i;ascii-numeric").unwrap();
        match registry.object(ObjectClass::Comparator, ObjRef::ext(numeric, 0)) {
            Some(Object::Comparator(c)) => assert_eq!(c.identifier(), "i;ascii-numeric"),
            other => panic!("Expected comparator, got {:?}", other),
        }
        assert!(registry
            .object(ObjectClass::MatchType, ObjRef::ext(numeric, 0))
            .is_none());
        assert!(registry
            .object(ObjectClass::MatchType, ObjRef::core(2))
            .is_some());
    }
}
