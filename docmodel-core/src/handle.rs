//! Lazy handles to referenced entities.
//!
//! Decoding a reference field yields a [`RefHandle`]: the target's identity,
//! its collection, and the (possibly scope-merged) summary that was embedded.
//! Callers read summary fields directly, materialize a typed value from the
//! summary when it carries enough fields, or resolve the full document
//! through a store driver.

use std::collections::BTreeSet;

use bson::{Bson, Document, Uuid};

use crate::codec::VersionCodec;
use crate::driver::{StoreDriver, StoreDriverExt};
use crate::error::{MappingError, MappingResult};
use crate::model::{AnyModel, Model, ModelExt, TypeKey};

/// A decoded reference: identity plus whatever summary fields were loaded.
#[derive(Debug, Clone)]
pub struct RefHandle {
    target: TypeKey,
    id: Uuid,
    collection: String,
    summary: Document,
    loaded_fields: BTreeSet<String>,
}

impl RefHandle {
    /// Creates a handle over a summary document.
    pub fn new(target: TypeKey, id: Uuid, collection: &str, summary: Document) -> Self {
        let loaded_fields = summary.keys().cloned().collect();
        Self {
            target,
            id,
            collection: collection.to_string(),
            summary,
            loaded_fields,
        }
    }

    /// Identifier of the referenced entity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Type of the referenced entity.
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// Collection the full document lives in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The summary fields this handle carries.
    pub fn summary(&self) -> &Document {
        &self.summary
    }

    /// Element names known to be loaded.
    pub fn loaded_fields(&self) -> &BTreeSet<String> {
        &self.loaded_fields
    }

    /// True when the given field was part of the summary.
    pub fn is_loaded(&self, field: &str) -> bool {
        self.loaded_fields.contains(field)
    }

    /// Reads a summary field.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.summary.get(field)
    }

    /// Builds a typed value from the summary alone.
    ///
    /// # Errors
    ///
    /// Fails when the summary lacks fields `M` requires; resolve through a
    /// driver instead.
    pub fn materialize<M: Model>(&self) -> MappingResult<M> {
        M::from_document(self.summary.clone())
    }

    /// Fetches and decodes the full document, dispatching to the concrete
    /// subtype its discriminator names.
    pub async fn resolve(
        &self,
        codec: &VersionCodec,
        driver: &dyn StoreDriver,
    ) -> MappingResult<Box<dyn AnyModel>> {
        let doc = driver.get_document(&self.collection, self.id).await?;
        codec.decode_root(self.target, doc)
    }

    /// Typed variant of [`RefHandle::resolve`].
    pub async fn resolve_as<M: Model>(
        &self,
        codec: &VersionCodec,
        driver: &dyn StoreDriver,
    ) -> MappingResult<M> {
        let actual = self.resolve(codec, driver).await?;
        let key = actual.type_key();
        actual.downcast_ref::<M>().cloned().ok_or_else(|| {
            MappingError::Decode(format!(
                "reference resolved to {} but {} was requested",
                key.name(),
                TypeKey::of::<M>().name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Author {
        id: Uuid,
        name: String,
    }

    impl Model for Author {
        fn collection_name() -> &'static str {
            "authors"
        }

        fn id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    #[test]
    fn summary_access_and_materialization() {
        let id = Uuid::new();
        let handle = RefHandle::new(
            TypeKey::of::<Author>(),
            id,
            "authors",
            doc! { "id": id, "name": "Ada" },
        );
        assert_eq!(handle.id(), id);
        assert_eq!(handle.collection(), "authors");
        assert!(handle.is_loaded("name"));
        assert!(!handle.is_loaded("bio"));
        assert_eq!(handle.get("name"), Some(&Bson::String("Ada".to_string())));

        let author: Author = handle.materialize().unwrap();
        assert_eq!(author.name, "Ada");
    }

    #[test]
    fn materialization_fails_on_a_narrow_summary() {
        let id = Uuid::new();
        let handle = RefHandle::new(TypeKey::of::<Author>(), id, "authors", doc! { "id": id });
        assert!(handle.materialize::<Author>().is_err());
    }
}
