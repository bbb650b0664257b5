//! In-memory driver implementation for the mapping layer.
//!
//! This module provides a simple but complete in-memory driver that stores
//! documents as BSON in HashMaps behind async-safe read-write locks, plus a
//! recording task runner for asserting on enqueued background work in tests.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, Uuid};
use mea::rwlock::RwLock;

use docmodel_core::{
    driver::StoreDriver,
    error::{MappingError, MappingResult},
    index::IndexSpec,
    runner::{FixUpJob, TaskRunner},
};

type CollectionMap = HashMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;
type IndexMap = HashMap<String, Vec<IndexSpec>>;

/// Thread-safe in-memory document store driver.
///
/// `MemoryDriver` is cloneable and uses `Arc`-wrapped internal state, so
/// clones share the same underlying data across async tasks. Path queries
/// scan the whole collection; index specs are tracked by name but never used
/// to accelerate lookups.
#[derive(Default, Clone, Debug)]
pub struct MemoryDriver {
    /// The main storage map: collection name -> (document id -> document).
    store: Arc<RwLock<StoreMap>>,
    /// Index specs registered per collection.
    indexes: Arc<RwLock<IndexMap>>,
}

impl MemoryDriver {
    /// Creates a new empty in-memory driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collections that have received at least one write.
    pub async fn list_collections(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }

    /// Number of documents stored in a collection.
    pub async fn collection_len(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

/// Matches `needle` against the value at a dotted path. Arrays are
/// transparent at every step (multikey), and a `$**` segment matches any one
/// document key.
fn matches_path(value: &Bson, segments: &[&str], needle: &Bson) -> bool {
    if let Bson::Array(items) = value {
        if items.iter().any(|item| matches_path(item, segments, needle)) {
            return true;
        }
    }
    match segments.split_first() {
        None => value == needle,
        Some((segment, rest)) => match value {
            Bson::Document(doc) => {
                if *segment == "$**" {
                    doc.values().any(|v| matches_path(v, rest, needle))
                } else {
                    doc.get(*segment)
                        .is_some_and(|v| matches_path(v, rest, needle))
                }
            }
            _ => false,
        },
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    async fn insert_documents(
        &self,
        collection: &str,
        docs: Vec<(Uuid, Document)>,
    ) -> MappingResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();
        for (id, doc) in docs {
            let key = id.to_string();
            if collection_map.contains_key(&key) {
                return Err(MappingError::Driver(format!(
                    "document {id} already exists in collection {collection}"
                )));
            }
            collection_map.insert(key, doc);
        }
        Ok(())
    }

    async fn replace_document(
        &self,
        collection: &str,
        id: Uuid,
        doc: Document,
    ) -> MappingResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .get_mut(collection)
            .and_then(|c| c.get_mut(&id.to_string()))
            .ok_or_else(|| MappingError::NotFound(id.to_string(), collection.to_string()))?;
        *slot = doc;
        Ok(())
    }

    async fn delete_documents(&self, collection: &str, ids: &[Uuid]) -> MappingResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for id in ids {
            if collection_map.remove(&id.to_string()).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[Uuid],
    ) -> MappingResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| collection_map.get(&id.to_string()).cloned())
            .collect())
    }

    async fn find_by_path(
        &self,
        collection: &str,
        path: &str,
        value: Bson,
    ) -> MappingResult<Vec<Document>> {
        let segments: Vec<&str> = path.split('.').collect();
        let store = self.store.read().await;
        let Some(collection_map) = store.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(collection_map
            .values()
            .filter(|doc| {
                matches_path(&Bson::Document((*doc).clone()), &segments, &value)
            })
            .cloned()
            .collect())
    }

    async fn list_indexes(&self, collection: &str) -> MappingResult<Vec<String>> {
        Ok(self
            .indexes
            .read()
            .await
            .get(collection)
            .map(|specs| specs.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> MappingResult<()> {
        let mut indexes = self.indexes.write().await;
        let specs = indexes.entry(collection.to_string()).or_default();
        if !specs.iter().any(|s| s.name == spec.name) {
            specs.push(spec.clone());
        }
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> MappingResult<()> {
        let mut indexes = self.indexes.write().await;
        let specs = indexes
            .get_mut(collection)
            .ok_or_else(|| MappingError::Driver(format!("no indexes on {collection}")))?;
        let before = specs.len();
        specs.retain(|s| s.name != name);
        if specs.len() == before {
            return Err(MappingError::Driver(format!(
                "no index named {name} on {collection}"
            )));
        }
        Ok(())
    }
}

/// Task runner that records enqueued work instead of executing it.
#[derive(Default, Clone, Debug)]
pub struct RecordingTaskRunner {
    fix_ups: Arc<RwLock<Vec<FixUpJob>>>,
    migrations: Arc<RwLock<Vec<String>>>,
}

impl RecordingTaskRunner {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix-up jobs enqueued so far, in order.
    pub async fn fix_up_jobs(&self) -> Vec<FixUpJob> {
        self.fix_ups.read().await.clone()
    }

    /// Collections whose migration was enqueued, in order.
    pub async fn migrations(&self) -> Vec<String> {
        self.migrations.read().await.clone()
    }
}

#[async_trait]
impl TaskRunner for RecordingTaskRunner {
    async fn enqueue_fix_up(&self, job: FixUpJob) -> MappingResult<()> {
        self.fix_ups.write().await.push(job);
        Ok(())
    }

    async fn enqueue_migrate_collection(&self, collection: &str) -> MappingResult<()> {
        self.migrations.write().await.push(collection.to_string());
        Ok(())
    }
}
