//! Payload items produced by the reader and accepted by the writer.
//!
//! [`PayloadItem`] enumerates every structural and value event a payload can
//! contain. The reader exposes one item per cursor advance; the writer takes
//! the start variants through `write_start` and synthesizes the rest from its
//! push calls.

use crate::value::{PrimitiveKind, ScalarValue, Value};

/// An instance annotation attached to a property (`"prop@term": value` on the
/// wire).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAnnotation {
    /// The annotation term, e.g. `odata.mediaContentType`.
    pub term: String,
    /// The annotation's scalar value; `None` is the JSON `null`.
    pub value: Option<ScalarValue>,
}

/// Annotation terms that may only appear in response payloads.
pub(crate) const RESPONSE_ONLY_TERMS: [&str; 2] = ["odata.count", "odata.nextLink"];

/// One structural or value item of a streamed payload.
///
/// Every `*Start` item is balanced by exactly one matching end item; scopes
/// nest strictly. Within one resource scope property names are unique across
/// all three announcement forms (`Property`, `PropertyInfoStart`,
/// `NestedResourceInfoStart`).
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadItem {
    /// Opens an entity or complex value scope.
    ResourceStart {
        /// The resource's payload-declared type name, if any.
        type_name: Option<String>,
    },
    /// Closes the innermost resource scope.
    ResourceEnd,
    /// Opens an ordered sequence of resources or stream items.
    ResourceSetStart {
        /// The set's payload-declared element type name, if any.
        type_name: Option<String>,
    },
    /// Closes the innermost resource-set scope.
    ResourceSetEnd,
    /// Opens a named link to a nested resource, resource set, or
    /// element-wise streamed primitive collection.
    NestedResourceInfoStart {
        /// The link's property name.
        name: String,
        /// Whether the link targets a collection.
        is_collection: bool,
    },
    /// Closes the innermost nested-resource-info scope.
    NestedResourceInfoEnd,
    /// Announces a property whose value follows as either a materialized
    /// `Primitive` or a `Stream`.
    PropertyInfoStart {
        /// The property name.
        name: String,
        /// The schema-declared primitive kind, if any.
        declared_primitive_kind: Option<PrimitiveKind>,
        /// The media content type announced for the value, if any.
        content_type: Option<String>,
        /// Instance annotations attached to the property.
        annotations: Vec<PropertyAnnotation>,
    },
    /// Closes the innermost property-info scope.
    PropertyEnd,
    /// A materialized scalar; `None` is the JSON `null`.
    Primitive {
        /// The scalar value.
        value: Option<ScalarValue>,
    },
    /// Signals that the active item's value must be drained through a scoped
    /// byte or text channel before the cursor may advance.
    Stream {
        /// The media content type of the streamed value, if any.
        content_type: Option<String>,
        /// The primitive kind governing the channel flavor.
        primitive_kind: PrimitiveKind,
    },
    /// A fully materialized property, written and read atomically.
    Property {
        /// The property name.
        name: String,
        /// The property value.
        value: Value,
    },
}

impl PayloadItem {
    /// The property or link name carried by this item, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::NestedResourceInfoStart { name, .. }
            | Self::PropertyInfoStart { name, .. }
            | Self::Property { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the name and value if this is a materialized [`Property`].
    ///
    /// [`Property`]: PayloadItem::Property
    #[must_use]
    pub fn as_property(&self) -> Option<(&str, &Value)> {
        if let Self::Property { name, value } = self {
            Some((name, value))
        } else {
            None
        }
    }

    /// Returns `true` if this item opens a scope.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            Self::ResourceStart { .. }
                | Self::ResourceSetStart { .. }
                | Self::NestedResourceInfoStart { .. }
                | Self::PropertyInfoStart { .. }
        )
    }

    /// Returns `true` if this item closes a scope.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(
            self,
            Self::ResourceEnd | Self::ResourceSetEnd | Self::NestedResourceInfoEnd | Self::PropertyEnd
        )
    }
}
