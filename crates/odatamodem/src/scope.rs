//! Scope records tracked by both state machines.
//!
//! One record per open payload scope, holding only owned bookkeeping: the
//! kind tag, the names already resolved in a resource, the materialized
//! property count, and the pending-value flags used to sequence property
//! and collection scopes. There are no parent back-references; the stack
//! index is the only linkage.

use std::collections::BTreeSet;

use crate::value::PrimitiveKind;

/// What kind of container a scope represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Resource,
    ResourceSet,
    NestedResourceInfo,
    PropertyInfo,
}

/// One open scope. Some fields only matter on one side (the reader buffers a
/// looked-ahead key, the writer frames lazy brackets); both machines share
/// the record shape.
#[derive(Debug)]
pub(crate) struct Scope {
    pub kind: ScopeKind,
    /// Property or link name for info scopes; element-name context for sets.
    pub name: Option<String>,
    /// Resource type driving schema lookups inside this scope.
    pub type_name: Option<String>,
    /// Names already resolved in this resource scope.
    pub seen: BTreeSet<String>,
    /// Materialized properties counted for this resource scope.
    pub materialized_count: usize,
    /// Whether a separator is required before the next member or element.
    pub needs_separator: bool,
    /// A member key consumed while sniffing for control information.
    pub lookahead_key: Option<String>,
    /// Whether an info scope links a collection.
    pub is_collection: bool,
    /// Whether this scope reads or writes primitive elements one by one.
    pub streamed_collection: bool,
    /// Declared element kind for collection scopes.
    pub element_kind: Option<PrimitiveKind>,
    /// Declared kind for property-info scopes.
    pub declared_kind: Option<PrimitiveKind>,
    /// Media content type announced for a property-info scope.
    pub content_type: Option<String>,
    /// Whether the scope's value (or first structural child) is resolved.
    pub value_written: bool,
    /// Whether the writer has emitted the lazy `[` for this collection.
    pub opened_bracket: bool,
}

impl Scope {
    fn base(kind: ScopeKind) -> Self {
        Self {
            kind,
            name: None,
            type_name: None,
            seen: BTreeSet::new(),
            materialized_count: 0,
            needs_separator: false,
            lookahead_key: None,
            is_collection: false,
            streamed_collection: false,
            element_kind: None,
            declared_kind: None,
            content_type: None,
            value_written: false,
            opened_bracket: false,
        }
    }

    pub fn resource(type_name: Option<String>) -> Self {
        Self {
            type_name,
            ..Self::base(ScopeKind::Resource)
        }
    }

    pub fn resource_set(type_name: Option<String>) -> Self {
        Self {
            type_name,
            ..Self::base(ScopeKind::ResourceSet)
        }
    }

    pub fn nested(name: String, is_collection: bool) -> Self {
        Self {
            name: Some(name),
            is_collection,
            ..Self::base(ScopeKind::NestedResourceInfo)
        }
    }

    pub fn streamed_collection(name: String, element_kind: Option<PrimitiveKind>) -> Self {
        Self {
            name: Some(name),
            is_collection: true,
            streamed_collection: true,
            element_kind,
            ..Self::base(ScopeKind::NestedResourceInfo)
        }
    }

    pub fn property_info(name: String, declared_kind: Option<PrimitiveKind>) -> Self {
        Self {
            name: Some(name),
            declared_kind,
            ..Self::base(ScopeKind::PropertyInfo)
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// The stack of open scopes.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    pub fn last(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Scope> {
        self.scopes.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_discipline() {
        let mut stack = ScopeStack::new();
        assert!(stack.is_empty());
        stack.push(Scope::resource(None));
        stack.push(Scope::nested("items".to_string(), true));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.last().map(|s| s.kind), Some(ScopeKind::NestedResourceInfo));
        assert_eq!(stack.pop().map(|s| s.display_name().to_string()).as_deref(), Some("items"));
        assert_eq!(stack.last().map(|s| s.kind), Some(ScopeKind::Resource));
    }

    #[test]
    fn seen_names_detect_duplicates() {
        let mut scope = Scope::resource(None);
        assert!(scope.seen.insert("id".to_string()));
        assert!(!scope.seen.insert("id".to_string()));
    }
}
