//! Declarative shape descriptors for model types.
//!
//! A shape is the registration-time description of a type's fields used to
//! drive encode/decode and member-map compilation. Shapes are declared
//! explicitly through [`ShapeBuilder`]; there is no runtime reflection over
//! arbitrary types.
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::shape::{Shape, FieldKind, MapRepr};
//!
//! let shape = Shape::builder()
//!     .identifier("id")
//!     .scalar("name")
//!     .reference::<Author>("author")
//!     .array("tags", FieldKind::Scalar)
//!     .build();
//! ```

use crate::model::TypeKey;

/// Internal wire representation of a map-like field.
///
/// The representation decides how map entries appear on the wire, which in
/// turn decides the path segment used when building index field names for
/// members nested inside map values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRepr {
    /// Entries serialized as a sub-document keyed by the map key.
    Document,
    /// Entries serialized as an array of `[key, value]` pairs.
    ArrayOfPairs,
    /// Entries serialized as an array of `{k, v}` documents.
    ArrayOfDocuments,
}

impl MapRepr {
    /// The wire-path segment contributed by the value position of this
    /// representation. Document-keyed maps have dynamic keys and contribute
    /// the wildcard segment.
    pub fn value_segment(&self) -> &'static str {
        match self {
            MapRepr::Document => "$**",
            MapRepr::ArrayOfPairs => "1",
            MapRepr::ArrayOfDocuments => "v",
        }
    }
}

/// The kind of value a declared field holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain scalar value (string, number, boolean, date, identifier...).
    Scalar,
    /// An embedded sub-document of a registered (possibly polymorphic) type.
    Document(TypeKey),
    /// An array-like container; the element kind is visited at the same wire
    /// path (multikey semantics).
    Array(Box<FieldKind>),
    /// A map-like container with the given value kind and wire representation.
    Map {
        /// Kind of the map's values.
        value: Box<FieldKind>,
        /// Wire representation of the entries.
        repr: MapRepr,
    },
    /// A denormalized reference to another entity, embedded as a summary
    /// sub-document. `cascade_delete` propagates the delete of the owner to
    /// the referenced entity's dependents.
    Reference {
        /// Type key of the referenced entity.
        target: TypeKey,
        /// Whether deletes cascade through this reference.
        cascade_delete: bool,
    },
}

impl FieldKind {
    /// An embedded document of type `T`.
    pub fn document_of<T: 'static>() -> Self {
        FieldKind::Document(TypeKey::of::<T>())
    }

    /// A reference to entity type `T`.
    pub fn reference_to<T: 'static>() -> Self {
        FieldKind::Reference {
            target: TypeKey::of::<T>(),
            cascade_delete: false,
        }
    }

    /// A cascade-deleting reference to entity type `T`.
    pub fn cascade_reference_to<T: 'static>() -> Self {
        FieldKind::Reference {
            target: TypeKey::of::<T>(),
            cascade_delete: true,
        }
    }
}

/// One declared field of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Wire name of the field.
    pub name: String,
    /// Kind of value the field holds.
    pub kind: FieldKind,
    /// Whether this field is the owning type's identifier.
    pub identifier: bool,
}

/// The declarative description of a type's fields used to drive
/// encode/decode and dependency compilation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
    fields: Vec<FieldDescriptor>,
}

impl Shape {
    /// Creates a new shape builder.
    pub fn builder() -> ShapeBuilder {
        ShapeBuilder::new()
    }

    /// An empty shape, used for auto-generated default descriptors.
    pub fn empty() -> Self {
        Shape::default()
    }

    /// Returns the declared fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Returns the declared field with the given wire name, if any.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the identifier field, if the shape declares one.
    pub fn identifier(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.identifier)
    }

    /// True iff the shape declares an identifier field, i.e. the type is an
    /// entity.
    pub fn has_identifier(&self) -> bool {
        self.identifier().is_some()
    }
}

/// Fluent builder for [`Shape`] values.
#[derive(Debug, Clone, Default)]
pub struct ShapeBuilder {
    fields: Vec<FieldDescriptor>,
}

impl ShapeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        ShapeBuilder::default()
    }

    /// Declares the identifier field.
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Scalar,
            identifier: true,
        });
        self
    }

    /// Declares a plain scalar field.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Scalar,
            identifier: false,
        });
        self
    }

    /// Declares an embedded sub-document field of registered type `T`.
    pub fn document<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::document_of::<T>(),
            identifier: false,
        });
        self
    }

    /// Declares an array-like field with the given element kind.
    pub fn array(mut self, name: impl Into<String>, element: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Array(Box::new(element)),
            identifier: false,
        });
        self
    }

    /// Declares a map-like field with the given value kind and wire
    /// representation.
    pub fn map(mut self, name: impl Into<String>, value: FieldKind, repr: MapRepr) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::Map {
                value: Box::new(value),
                repr,
            },
            identifier: false,
        });
        self
    }

    /// Declares a denormalized reference to entity type `T`.
    pub fn reference<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::reference_to::<T>(),
            identifier: false,
        });
        self
    }

    /// Declares a cascade-deleting reference to entity type `T`.
    pub fn cascade_reference<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind: FieldKind::cascade_reference_to::<T>(),
            identifier: false,
        });
        self
    }

    /// Declares a pre-built field descriptor.
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    /// Builds and returns the final shape.
    pub fn build(self) -> Shape {
        Shape {
            fields: self.fields,
        }
    }
}
