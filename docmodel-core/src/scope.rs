//! Decode scopes: per-operation identity caching of decoded documents.
//!
//! A [`DecodeScope`] collects every document seen while decoding one logical
//! operation, keyed by type and identifier. Denormalized reference summaries
//! of the same entity are merged field-wise, so a later lookup within the
//! scope can serve a richer view than any single summary carried. A fully
//! loaded document always wins over summaries.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use bson::{Document, Uuid};

use crate::model::TypeKey;

/// One cached document within a scope.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    /// The cached (possibly merged) document.
    pub doc: Document,
    /// Top-level element names known to be loaded.
    pub loaded_fields: BTreeSet<String>,
    /// False once a full document has been seen for this entity.
    pub is_summary: bool,
}

/// Identity cache for one decode operation.
///
/// Interior-mutable behind a mutex so a scope can be threaded through nested
/// decodes by shared reference.
#[derive(Debug, Default)]
pub struct DecodeScope {
    entries: Mutex<HashMap<(TypeKey, Uuid), ScopeEntry>>,
}

impl DecodeScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        DecodeScope::default()
    }

    /// Caches a fully loaded document, replacing any summary seen earlier.
    pub fn insert_full(&self, key: TypeKey, id: Uuid, doc: Document) {
        self.insert(key, id, doc, false);
    }

    /// Caches a reference summary, merging it field-wise with any summary
    /// already cached. A cached full document is left untouched.
    pub fn insert_summary(&self, key: TypeKey, id: Uuid, doc: Document) {
        self.insert(key, id, doc, true);
    }

    fn insert(&self, key: TypeKey, id: Uuid, doc: Document, is_summary: bool) {
        let fields: BTreeSet<String> = doc.keys().cloned().collect();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&(key, id)) {
            None => {
                entries.insert(
                    (key, id),
                    ScopeEntry {
                        doc,
                        loaded_fields: fields,
                        is_summary,
                    },
                );
            }
            Some(cached) if !cached.is_summary => {
                // Full documents are authoritative within a scope.
            }
            Some(cached) if !is_summary => {
                cached.doc = doc;
                cached.loaded_fields.extend(fields);
                cached.is_summary = false;
            }
            Some(cached) => {
                // Summary onto summary: fill in fields the cached view lacks.
                for (name, value) in doc {
                    if !cached.doc.contains_key(&name) {
                        cached.doc.insert(name.clone(), value);
                    }
                    cached.loaded_fields.insert(name);
                }
            }
        }
    }

    /// Returns the cached (merged) view of an entity, if any.
    pub fn get(&self, key: TypeKey, id: Uuid) -> Option<ScopeEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(key, id))
            .cloned()
    }

    /// Number of distinct entities cached.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
