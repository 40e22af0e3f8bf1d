//! The schema oracle consumed by the reader and writer.
//!
//! The state machines never validate against a full metadata model; they ask
//! a [`SchemaOracle`] one question — "what is declared for this property?" —
//! and use the answer to pick streaming eligibility and to check materialized
//! value kinds.

use std::collections::BTreeMap;

use crate::value::PrimitiveKind;

/// The declared shape of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDeclaration {
    /// The declared primitive kind; for collections, the element kind.
    /// `None` declares a structured (resource) value.
    pub primitive_kind: Option<PrimitiveKind>,
    /// Whether the property is a collection.
    pub is_collection: bool,
    /// Whether the property is part of the entity key. Key properties are
    /// always materialized, never streamed.
    pub is_key: bool,
}

impl PropertyDeclaration {
    /// A single primitive property of the given kind.
    #[must_use]
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self {
            primitive_kind: Some(kind),
            is_collection: false,
            is_key: false,
        }
    }

    /// A key property of the given kind.
    #[must_use]
    pub fn key(kind: PrimitiveKind) -> Self {
        Self {
            primitive_kind: Some(kind),
            is_collection: false,
            is_key: true,
        }
    }

    /// A collection of primitives of the given element kind.
    #[must_use]
    pub fn collection_of(element_kind: PrimitiveKind) -> Self {
        Self {
            primitive_kind: Some(element_kind),
            is_collection: true,
            is_key: false,
        }
    }

    /// A single structured (resource) property.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            primitive_kind: None,
            is_collection: false,
            is_key: false,
        }
    }
}

/// Answers property-declaration lookups for the state machines.
///
/// `resource_type` is the type name of the enclosing resource scope when one
/// is known (from reader options or a payload type annotation); oracles may
/// ignore it for untyped models.
pub trait SchemaOracle {
    /// Looks up the declaration of `property_name` on `resource_type`.
    fn lookup_property(
        &self,
        resource_type: Option<&str>,
        property_name: &str,
    ) -> Option<PropertyDeclaration>;
}

impl<S: SchemaOracle + ?Sized> SchemaOracle for &S {
    fn lookup_property(
        &self,
        resource_type: Option<&str>,
        property_name: &str,
    ) -> Option<PropertyDeclaration> {
        (**self).lookup_property(resource_type, property_name)
    }
}

/// The empty oracle: nothing is declared.
impl SchemaOracle for () {
    fn lookup_property(&self, _: Option<&str>, _: &str) -> Option<PropertyDeclaration> {
        None
    }
}

/// A map-backed [`SchemaOracle`] for callers and tests.
///
/// Declarations may be scoped to a type name or left unscoped; scoped
/// declarations win when the lookup carries a matching resource type.
///
/// # Examples
///
/// ```
/// use odatamodem::{PrimitiveKind, PropertyDeclaration, SchemaOracle, TypeSchema};
///
/// let mut schema = TypeSchema::new();
/// schema.declare("id", PropertyDeclaration::key(PrimitiveKind::String));
/// schema.declare_on(
///     "Model.Note",
///     "body",
///     PropertyDeclaration::primitive(PrimitiveKind::String),
/// );
///
/// assert!(schema.lookup_property(None, "id").is_some());
/// assert!(schema.lookup_property(Some("Model.Note"), "body").is_some());
/// assert!(schema.lookup_property(None, "body").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeSchema {
    unscoped: BTreeMap<String, PropertyDeclaration>,
    scoped: BTreeMap<String, BTreeMap<String, PropertyDeclaration>>,
}

impl TypeSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `name` for resources of any type.
    pub fn declare(&mut self, name: impl Into<String>, declaration: PropertyDeclaration) -> &mut Self {
        self.unscoped.insert(name.into(), declaration);
        self
    }

    /// Declares `name` for resources of type `type_name` only.
    pub fn declare_on(
        &mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        declaration: PropertyDeclaration,
    ) -> &mut Self {
        self.scoped
            .entry(type_name.into())
            .or_default()
            .insert(name.into(), declaration);
        self
    }
}

impl SchemaOracle for TypeSchema {
    fn lookup_property(
        &self,
        resource_type: Option<&str>,
        property_name: &str,
    ) -> Option<PropertyDeclaration> {
        if let Some(type_name) = resource_type {
            if let Some(decl) = self.scoped.get(type_name).and_then(|m| m.get(property_name)) {
                return Some(*decl);
            }
        }
        self.unscoped.get(property_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_declaration_wins() {
        let mut schema = TypeSchema::new();
        schema.declare("age", PropertyDeclaration::primitive(PrimitiveKind::Int64));
        schema.declare_on(
            "Model.Person",
            "age",
            PropertyDeclaration::primitive(PrimitiveKind::Int32),
        );

        let scoped = schema.lookup_property(Some("Model.Person"), "age").unwrap();
        assert_eq!(scoped.primitive_kind, Some(PrimitiveKind::Int32));
        let unscoped = schema.lookup_property(None, "age").unwrap();
        assert_eq!(unscoped.primitive_kind, Some(PrimitiveKind::Int64));
    }

    #[test]
    fn empty_oracle_declares_nothing() {
        assert!(().lookup_property(None, "anything").is_none());
    }
}
