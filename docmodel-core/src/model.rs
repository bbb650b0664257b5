//! Core traits and types for model representation.
//!
//! This module provides the fundamental traits that all mapped models must
//! implement, the runtime type identity used to key the schema catalog, and
//! a type-erased model trait for working with polymorphic values.

use bson::{Bson, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId, type_name};

use crate::error::{MappingError, MappingResult};

/// Runtime identity of a model type.
///
/// A `TypeKey` pairs the `TypeId` of a concrete Rust type with its type name
/// for diagnostics. All catalog structures are keyed by `TypeKey`; equality
/// and hashing use only the `TypeId`.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the type key for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the full type name (including module path).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name with the module path stripped.
    pub fn short_name(&self) -> &'static str {
        self.name
            .rsplit("::")
            .next()
            .unwrap_or(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Core trait that all mapped model types must implement.
///
/// Models are plain typed values; the mapping layer handles their wire
/// encoding through the schema catalog. A model that declares an identifier
/// (by returning `Some` from [`Model::id`] and marking the field in its
/// shape) is an entity; other models are embedded sub-documents.
///
/// # Example
///
/// ```ignore
/// use docmodel_core::model::Model;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub id: Uuid,
///     pub name: String,
/// }
///
/// impl Model for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///
///     fn id(&self) -> Option<Uuid> {
///         Some(self.id)
///     }
/// }
/// ```
pub trait Model: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns the name of the collection documents of this type are stored
    /// in. Sub-document types that are never root-stored may return a
    /// placeholder; the value is only consulted for root types.
    fn collection_name() -> &'static str;

    /// Returns this model's unique identifier, or `None` for non-entities.
    fn id(&self) -> Option<Uuid> {
        None
    }
}

/// Extension trait providing BSON conversion utilities for models.
///
/// Automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model {
    /// Converts this model to a BSON document using plain serde mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not
    /// serialize to a document.
    fn to_document(&self) -> MappingResult<bson::Document>;

    /// Creates a model from a BSON document using plain serde mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn from_document(doc: bson::Document) -> MappingResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_document(&self) -> MappingResult<bson::Document> {
        match serialize_to_bson(self)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(MappingError::Serialization(format!(
                "model {} did not serialize to a document (got {:?})",
                type_name::<M>(),
                other.element_type()
            ))),
        }
    }

    fn from_document(doc: bson::Document) -> MappingResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(doc))?)
    }
}

/// Type-erased model trait for working with polymorphic values uniformly.
///
/// This trait enables dynamic dispatch for models when the concrete type is
/// not known at compile time. The polymorphic codec decodes into
/// `Box<dyn AnyModel>` so that a document stored under a base type can
/// materialize as the concrete subtype named by its discriminator.
pub trait AnyModel: Send + Sync {
    /// Returns the runtime type key of the concrete model.
    fn type_key(&self) -> TypeKey;

    /// Returns the model's identifier, or `None` for non-entities.
    fn model_id(&self) -> Option<Uuid>;

    /// Returns the collection name of the concrete model type.
    fn model_collection(&self) -> &'static str;

    /// Returns a reference to the model as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the model as a generic `Any` type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Clones the model into a new boxed `AnyModel`.
    fn clone_box(&self) -> Box<dyn AnyModel>;

    /// Converts this model to a BSON document via plain serde mapping.
    fn to_any_document(&self) -> MappingResult<bson::Document>;
}

impl dyn AnyModel {
    /// Attempts to downcast a reference to a specific model type.
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Attempts to downcast a mutable reference to a specific model type.
    pub fn downcast_mut<M: Model>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut::<M>()
    }
}

impl<M: Model> AnyModel for M {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<M>()
    }

    fn model_id(&self) -> Option<Uuid> {
        self.id()
    }

    fn model_collection(&self) -> &'static str {
        Self::collection_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn AnyModel> {
        Box::new(self.clone())
    }

    fn to_any_document(&self) -> MappingResult<bson::Document> {
        ModelExt::to_document(self)
    }
}

impl Clone for Box<dyn AnyModel> {
    fn clone(&self) -> Box<dyn AnyModel> {
        self.clone_box()
    }
}

/// Conversion trait for converting any model into a boxed `AnyModel`.
pub trait IntoAnyModel {
    /// Converts this value into a boxed `AnyModel`.
    fn into_any_model(self) -> Box<dyn AnyModel>;
}

impl<M: Model> IntoAnyModel for M {
    fn into_any_model(self) -> Box<dyn AnyModel> {
        Box::new(self) as Box<dyn AnyModel>
    }
}

impl IntoAnyModel for Box<dyn AnyModel> {
    fn into_any_model(self) -> Box<dyn AnyModel> {
        self
    }
}

/// Parses an identifier out of a BSON element.
///
/// Accepts the binary UUID representation and the string form. Anything else
/// is a [`MappingError::MalformedIdentifier`].
pub fn uuid_from_bson(value: &Bson) -> MappingResult<Uuid> {
    match value {
        Bson::String(s) => {
            Uuid::parse_str(s).map_err(|_| MappingError::MalformedIdentifier(s.clone()))
        }
        other => deserialize_from_bson(other.clone())
            .map_err(|_| MappingError::MalformedIdentifier(format!("{other:?}"))),
    }
}
