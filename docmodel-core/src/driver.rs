//! The consumed document-store driver interface.
//!
//! The mapping layer never talks to a database directly; everything flows
//! through [`StoreDriver`], an object-safe async trait a backing store
//! implements. `docmodel-memory` provides the in-memory implementation used
//! in tests.

use async_trait::async_trait;
use bson::{Bson, Document, Uuid};

use crate::error::{MappingError, MappingResult};
use crate::index::IndexSpec;

/// Object-safe async interface to a document store.
///
/// All operations address documents by collection name and identifier.
/// Drivers surface their own failures as [`MappingError::Driver`].
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Inserts the given documents, keyed by identifier.
    async fn insert_documents(
        &self,
        collection: &str,
        docs: Vec<(Uuid, Document)>,
    ) -> MappingResult<()>;

    /// Replaces the document stored under `id`.
    async fn replace_document(
        &self,
        collection: &str,
        id: Uuid,
        doc: Document,
    ) -> MappingResult<()>;

    /// Deletes the documents stored under the given ids, returning how many
    /// actually existed.
    async fn delete_documents(&self, collection: &str, ids: &[Uuid]) -> MappingResult<u64>;

    /// Fetches the documents stored under the given ids; missing ids are
    /// silently skipped.
    async fn get_documents(&self, collection: &str, ids: &[Uuid]) -> MappingResult<Vec<Document>>;

    /// Finds every document with `value` at the dotted wire path. Arrays
    /// along the path match any element; a `$**` segment matches any one
    /// map key.
    async fn find_by_path(
        &self,
        collection: &str,
        path: &str,
        value: Bson,
    ) -> MappingResult<Vec<Document>>;

    /// Names of the indexes existing on a collection.
    async fn list_indexes(&self, collection: &str) -> MappingResult<Vec<String>>;

    /// Creates an index; creating an index that already exists is a no-op.
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> MappingResult<()>;

    /// Drops an index by name.
    async fn drop_index(&self, collection: &str, name: &str) -> MappingResult<()>;
}

/// Point-lookup conveniences over any [`StoreDriver`].
#[async_trait]
pub trait StoreDriverExt: StoreDriver {
    /// Fetches one document, failing with [`MappingError::NotFound`] when it
    /// does not exist.
    async fn get_document(&self, collection: &str, id: Uuid) -> MappingResult<Document> {
        self.get_documents(collection, &[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MappingError::NotFound(id.to_string(), collection.to_string()))
    }

    /// Fetches one document, converting not-found (including malformed
    /// identifiers) into `None`.
    async fn try_get_document(
        &self,
        collection: &str,
        id: Uuid,
    ) -> MappingResult<Option<Document>> {
        match self.get_document(collection, id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl<D: StoreDriver + ?Sized> StoreDriverExt for D {}
