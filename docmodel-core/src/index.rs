//! Index planning from the frozen catalog.
//!
//! Index names are deterministic functions of what they index: the version
//! index is always `ver`, a reference index is `ref_` followed by the dotted
//! identifier path it covers, and a composite document index is `doc_`
//! followed by the underscore-joined field names. Deterministic names let
//! [`ensure_indexes`] diff the planned set against what a collection already
//! has and create only what is missing.

use tracing::info;

use crate::catalog::FrozenCatalog;
use crate::codec::VERSION_ELEMENT;
use crate::driver::StoreDriver;
use crate::error::MappingResult;
use crate::model::TypeKey;

/// A planned index on one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Deterministic index name.
    pub name: String,
    /// Dotted wire paths the index covers, in order.
    pub keys: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Sparse indexes skip documents missing the indexed path.
    pub sparse: bool,
}

impl IndexSpec {
    /// The version index every root collection carries.
    pub fn version() -> Self {
        IndexSpec {
            name: "ver".to_string(),
            keys: vec![VERSION_ELEMENT.to_string()],
            unique: false,
            sparse: false,
        }
    }

    /// A sparse index over one embedded reference identifier path. Sparse
    /// because documents of sibling subtypes may not carry the path at all.
    pub fn reference(id_path: &str) -> Self {
        IndexSpec {
            name: format!("ref_{id_path}"),
            keys: vec![id_path.to_string()],
            unique: false,
            sparse: true,
        }
    }

    /// A composite index over declared document fields.
    pub fn document(fields: &[&str]) -> Self {
        IndexSpec {
            name: composite_index_name(fields),
            keys: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
            sparse: false,
        }
    }

    /// Marks the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Deterministic name of a composite document index.
pub fn composite_index_name(fields: &[&str]) -> String {
    format!("doc_{}", fields.join("_"))
}

/// The full planned index set for documents of `root`: the version index
/// plus one sparse reference index per compiled dependency edge.
pub fn index_specs_for(catalog: &FrozenCatalog, root: TypeKey) -> Vec<IndexSpec> {
    let mut specs = vec![IndexSpec::version()];
    for id_path in catalog.dependencies().reference_id_paths(root) {
        specs.push(IndexSpec::reference(id_path));
    }
    specs
}

/// Creates the missing indexes for `root`'s collection, returning how many
/// were created. Existing indexes are matched by name and left alone.
pub async fn ensure_indexes(
    catalog: &FrozenCatalog,
    driver: &dyn StoreDriver,
    root: TypeKey,
) -> MappingResult<usize> {
    let Some(collection) = catalog.collection_of(root) else {
        return Ok(0);
    };
    let existing = driver.list_indexes(collection).await?;
    let mut created = 0;
    for spec in index_specs_for(catalog, root) {
        if existing.iter().any(|name| *name == spec.name) {
            continue;
        }
        driver.create_index(collection, &spec).await?;
        created += 1;
    }
    if created > 0 {
        info!(collection, created, "ensured collection indexes");
    }
    Ok(created)
}
