//! The serializer seam between schemas and the codec layer.
//!
//! Every schema carries a [`ModelSerializer`] that converts between a typed
//! model and a BSON document for that schema's wire shape. The default,
//! [`SerdeSerializer`], maps the current type through serde; custom
//! implementations decode legacy wire shapes (secondary or fallback schemas)
//! into the current type.

use bson::Document;
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{MappingError, MappingResult};
use crate::model::{AnyModel, Model, ModelExt};

/// Object-safe encoder/decoder for one schema's wire shape.
pub trait ModelSerializer: Send + Sync {
    /// Encodes a model into this schema's wire shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not of the type this serializer was
    /// registered for, or if serialization fails.
    fn encode(&self, model: &dyn AnyModel) -> MappingResult<Document>;

    /// Decodes a wire document of this schema's shape into the current model
    /// type.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn decode(&self, doc: Document) -> MappingResult<Box<dyn AnyModel>>;
}

/// Shared handle to a serializer.
pub type SerializerRef = Arc<dyn ModelSerializer>;

/// Default serializer mapping a model type straight through serde.
pub struct SerdeSerializer<M: Model> {
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> SerdeSerializer<M> {
    /// Creates a serde-backed serializer for `M`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Creates a shared serializer handle for `M`.
    pub fn shared() -> SerializerRef {
        Arc::new(Self::new())
    }
}

impl<M: Model> Default for SerdeSerializer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ModelSerializer for SerdeSerializer<M> {
    fn encode(&self, model: &dyn AnyModel) -> MappingResult<Document> {
        let typed = model
            .as_any()
            .downcast_ref::<M>()
            .ok_or_else(|| {
                MappingError::Serialization(format!(
                    "serializer for {} received a {}",
                    type_name::<M>(),
                    model.type_key()
                ))
            })?;
        typed.to_document()
    }

    fn decode(&self, doc: Document) -> MappingResult<Box<dyn AnyModel>> {
        let typed = M::from_document(doc)?;
        Ok(Box::new(typed))
    }
}

/// Serializer built from a pair of closures; convenient for registering
/// legacy-schema decoders without a named type.
pub struct FnSerializer<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnSerializer<E, D>
where
    E: Fn(&dyn AnyModel) -> MappingResult<Document> + Send + Sync,
    D: Fn(Document) -> MappingResult<Box<dyn AnyModel>> + Send + Sync,
{
    /// Wraps an encode/decode closure pair as a serializer.
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<E, D> ModelSerializer for FnSerializer<E, D>
where
    E: Fn(&dyn AnyModel) -> MappingResult<Document> + Send + Sync,
    D: Fn(Document) -> MappingResult<Box<dyn AnyModel>> + Send + Sync,
{
    fn encode(&self, model: &dyn AnyModel) -> MappingResult<Document> {
        (self.encode)(model)
    }

    fn decode(&self, doc: Document) -> MappingResult<Box<dyn AnyModel>> {
        (self.decode)(doc)
    }
}

/// A decode-only serializer for legacy schemas that are never written
/// forward. Encoding through it is a configuration error.
pub fn decode_only<D>(decode: D) -> SerializerRef
where
    D: Fn(Document) -> MappingResult<Box<dyn AnyModel>> + Send + Sync + 'static,
{
    Arc::new(FnSerializer::new(
        |model: &dyn AnyModel| {
            Err(MappingError::Configuration(format!(
                "legacy schema serializer for {} cannot encode",
                model.type_key()
            )))
        },
        decode,
    ))
}
