//! The schema catalog: registration, the freeze transition, and the frozen
//! read view.
//!
//! A [`SchemaCatalog`] collects model maps during startup and freezes exactly
//! once into a [`FrozenCatalog`]. The freeze transition links declared base
//! types (materializing default maps for bases never registered explicitly),
//! registers discriminators, compiles every root type's member graph, and
//! compiles the dependency map. After freeze the catalog is immutable; the
//! only mutation left is the side cache of auto-described ad hoc types.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, info};

use crate::depend::DependencyMap;
use crate::discriminator::DiscriminatorRegistry;
use crate::error::{MappingError, MappingResult};
use crate::member::{MemberGraph, ShapeSource, compile_member_graph};
use crate::model::{Model, TypeKey};
use crate::schema::{ModelMap, ModelMapBuilder, ModelMapSchema, PendingMap};
use crate::serializer::SerializerRef;
use crate::shape::Shape;
use crate::version::DocumentVersion;

#[derive(Default)]
struct BuildState {
    pending: Vec<PendingMap>,
    registered: HashSet<TypeKey>,
}

/// Mutable registration surface of the mapping layer.
///
/// Thread-safe; registrations may arrive from any thread until the first
/// successful [`SchemaCatalog::freeze`], after which further registration
/// fails with [`MappingError::FrozenCatalog`].
pub struct SchemaCatalog {
    version: DocumentVersion,
    state: RwLock<BuildState>,
    frozen: OnceLock<Arc<FrozenCatalog>>,
}

impl SchemaCatalog {
    /// Creates a catalog writing documents tagged with `version`.
    pub fn new(version: DocumentVersion) -> Self {
        Self {
            version,
            state: RwLock::new(BuildState::default()),
            frozen: OnceLock::new(),
        }
    }

    /// The version stamped into documents written through this catalog.
    pub fn version(&self) -> &DocumentVersion {
        &self.version
    }

    /// True once [`SchemaCatalog::freeze`] has succeeded.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Starts registering a model map for `T` with the given active schema,
    /// decoded through plain serde mapping.
    pub fn add_schema<T: Model>(
        &self,
        active_schema_id: impl Into<String>,
        shape: Shape,
    ) -> ModelMapBuilder<'_, T> {
        ModelMapBuilder::new(self, active_schema_id, shape, None)
    }

    /// Starts registering a model map for `T` with a custom active-schema
    /// serializer.
    pub fn add_schema_with<T: Model>(
        &self,
        active_schema_id: impl Into<String>,
        shape: Shape,
        serializer: SerializerRef,
    ) -> ModelMapBuilder<'_, T> {
        ModelMapBuilder::new(self, active_schema_id, shape, Some(serializer))
    }

    pub(crate) fn commit(&self, pending: PendingMap) -> MappingResult<()> {
        if self.is_frozen() {
            return Err(MappingError::FrozenCatalog(
                pending.type_key.name().to_string(),
            ));
        }
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !state.registered.insert(pending.type_key) {
            return Err(MappingError::Configuration(format!(
                "type {} is already registered",
                pending.type_key.name()
            )));
        }
        debug!(
            model = pending.type_key.name(),
            schema = %pending.active.id,
            "registered model map"
        );
        state.pending.push(pending);
        Ok(())
    }

    /// Freezes the catalog, returning the immutable read view.
    ///
    /// Idempotent: concurrent and repeated calls observe the same frozen
    /// snapshot. A failed freeze leaves the catalog unfrozen so the
    /// configuration error can be fixed and freeze retried.
    ///
    /// # Errors
    ///
    /// Fails on cyclic member definitions, discriminators registered on
    /// abstract types, and other configuration inconsistencies.
    pub fn freeze(&self) -> MappingResult<Arc<FrozenCatalog>> {
        if let Some(frozen) = self.frozen.get() {
            return Ok(frozen.clone());
        }
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Lost the race: another thread froze while we waited for the lock.
        if let Some(frozen) = self.frozen.get() {
            return Ok(frozen.clone());
        }
        // Build from a snapshot: a failed freeze keeps the registrations in
        // place so the configuration can be corrected and freeze retried.
        let snapshot = state.pending.clone();
        let frozen = Arc::new(build_frozen(self.version.clone(), snapshot)?);
        state.pending.clear();
        let _ = self.frozen.set(frozen.clone());
        info!(
            version = %self.version,
            types = frozen.maps.len(),
            edges = frozen.depend.edges().len(),
            "schema catalog frozen"
        );
        Ok(frozen)
    }
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("version", &self.version)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// The immutable read view produced by [`SchemaCatalog::freeze`].
pub struct FrozenCatalog {
    version: DocumentVersion,
    maps: HashMap<TypeKey, Arc<ModelMap>>,
    discriminators: DiscriminatorRegistry,
    graphs: HashMap<TypeKey, MemberGraph>,
    depend: DependencyMap,
    // Side cache for unregistered types described on first use.
    adhoc: RwLock<HashMap<TypeKey, Arc<ModelMap>>>,
}

impl FrozenCatalog {
    /// The version stamped into documents written through this catalog.
    pub fn version(&self) -> &DocumentVersion {
        &self.version
    }

    /// Looks up the model map of a type by key.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::NotRegistered`] when the type was neither
    /// registered nor previously auto-described.
    pub fn model_map(&self, key: TypeKey) -> MappingResult<Arc<ModelMap>> {
        if let Some(map) = self.maps.get(&key) {
            return Ok(map.clone());
        }
        self.adhoc
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| MappingError::NotRegistered(key.name().to_string()))
    }

    /// Returns the model map of `M`, auto-describing and caching a default
    /// map when `M` was never registered. Ad hoc maps use plain serde
    /// mapping, an empty shape, and a generated schema id.
    pub fn model_map_of<M: Model>(&self) -> Arc<ModelMap> {
        let key = TypeKey::of::<M>();
        if let Ok(map) = self.model_map(key) {
            return map;
        }
        let mut adhoc = self
            .adhoc
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        adhoc
            .entry(key)
            .or_insert_with(|| {
                debug!(model = key.name(), "auto-describing unregistered type");
                // Ad hoc types carry no base and are never abstract, so the
                // tag registration cannot fail.
                let _ = self
                    .discriminators
                    .add_discriminator(key, key.short_name());
                generated_map::<M>()
            })
            .clone()
    }

    /// The active schema of `M`, auto-describing the type if needed.
    pub fn active_schema_of<M: Model>(&self) -> Arc<ModelMapSchema> {
        self.model_map_of::<M>().active.clone()
    }

    /// The discriminator registry.
    pub fn discriminators(&self) -> &DiscriminatorRegistry {
        &self.discriminators
    }

    /// The compiled member graph of a root type.
    pub fn member_graph(&self, key: TypeKey) -> Option<&MemberGraph> {
        self.graphs.get(&key)
    }

    /// The compiled dependency map.
    pub fn dependencies(&self) -> &DependencyMap {
        &self.depend
    }

    /// The collection documents of this type are root-stored in, resolved
    /// through the base chain to the hierarchy root.
    pub fn collection_of(&self, key: TypeKey) -> Option<&'static str> {
        self.maps.get(&key).map(|m| m.collection)
    }
}

impl std::fmt::Debug for FrozenCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrozenCatalog")
            .field("version", &self.version)
            .field("types", &self.maps.len())
            .field("edges", &self.depend.edges().len())
            .finish()
    }
}

fn generated_map<M: Model>() -> Arc<ModelMap> {
    let pending = PendingMap::generated_for::<M>();
    Arc::new(ModelMap {
        type_key: pending.type_key,
        collection: pending.collection,
        is_abstract: false,
        base: None,
        discriminator: None,
        active: Arc::new(ModelMapSchema {
            id: pending.active.id,
            base_schema_id: None,
            is_entity: false,
            shape: pending.active.shape,
            serializer: pending.active.serializer,
        }),
        secondary: Vec::new(),
        fallback_schema: None,
        fallback_serializer: None,
        fix_up: None,
        generated: true,
    })
}

fn build_frozen(
    version: DocumentVersion,
    mut pending: Vec<PendingMap>,
) -> MappingResult<FrozenCatalog> {
    // Base linking: materialize default maps for declared bases that were
    // never registered explicitly. Materialized maps declare no base of
    // their own, so one sweep per generation converges.
    loop {
        let known: HashSet<TypeKey> = pending.iter().map(|p| p.type_key).collect();
        let mut materialized: Vec<PendingMap> = Vec::new();
        for map in &pending {
            if let Some(link) = &map.base {
                if !known.contains(&link.key)
                    && !materialized.iter().any(|m| m.type_key == link.key)
                {
                    debug!(base = link.key.name(), "materializing default base map");
                    materialized.push((link.materialize)());
                }
            }
        }
        if materialized.is_empty() {
            break;
        }
        pending.extend(materialized);
    }

    let mut bases: HashMap<TypeKey, TypeKey> = HashMap::new();
    let mut abstracts: HashSet<TypeKey> = HashSet::new();
    let mut active_ids: HashMap<TypeKey, String> = HashMap::new();
    let mut declared_collections: HashMap<TypeKey, &'static str> = HashMap::new();
    for map in &pending {
        if let Some(link) = &map.base {
            bases.insert(map.type_key, link.key);
        }
        if map.is_abstract {
            abstracts.insert(map.type_key);
        }
        active_ids.insert(map.type_key, map.active.id.clone());
        declared_collections.insert(map.type_key, map.collection);
    }

    // Subtypes are root-stored in the hierarchy root's collection.
    let root_collection = |mut key: TypeKey| -> &'static str {
        while let Some(base) = bases.get(&key) {
            key = *base;
        }
        declared_collections[&key]
    };

    let discriminators = DiscriminatorRegistry::new(bases.clone(), abstracts.clone());
    let mut maps: HashMap<TypeKey, Arc<ModelMap>> = HashMap::new();

    for map in pending {
        let base_schema_id = match (&map.explicit_base_schema_id, &map.base) {
            (Some(explicit), _) => Some(explicit.clone()),
            (None, Some(link)) => active_ids.get(&link.key).cloned(),
            (None, None) => None,
        };
        if let Some(tag) = &map.discriminator {
            discriminators.add_discriminator(map.type_key, tag.clone())?;
        }
        if let Some(convention) = map.convention {
            discriminators.set_convention(map.type_key, convention);
        }

        let seal = |schema: crate::schema::PendingSchema,
                    base_schema_id: Option<String>|
         -> Arc<ModelMapSchema> {
            Arc::new(ModelMapSchema {
                id: schema.id,
                base_schema_id,
                is_entity: schema.shape.has_identifier(),
                shape: schema.shape,
                serializer: schema.serializer,
            })
        };

        let active = seal(map.active, base_schema_id);
        let secondary: Vec<Arc<ModelMapSchema>> =
            map.secondary.into_iter().map(|s| seal(s, None)).collect();
        let fallback_schema = map.fallback_schema.map(|s| seal(s, None));

        maps.insert(
            map.type_key,
            Arc::new(ModelMap {
                type_key: map.type_key,
                collection: root_collection(map.type_key),
                is_abstract: map.is_abstract,
                base: map.base.as_ref().map(|link| link.key),
                discriminator: map.discriminator,
                active,
                secondary,
                fallback_schema,
                fallback_serializer: map.fallback_serializer,
                fix_up: map.fix_up,
                generated: map.generated,
            }),
        );
    }

    // Member graphs compile against every reachable shape of a type (active,
    // secondary, and fallback), since legacy documents still carry the older
    // layouts.
    let source: ShapeSource<'_> = maps
        .values()
        .map(|m| {
            (
                m.type_key,
                m.schemas()
                    .map(|s| (s.id.as_str(), &s.shape))
                    .collect::<Vec<(&str, &Shape)>>(),
            )
        })
        .collect();
    let mut graphs: HashMap<TypeKey, MemberGraph> = HashMap::new();
    for map in maps.values() {
        if map.is_abstract {
            continue;
        }
        graphs.insert(map.type_key, compile_member_graph(map.type_key, &source)?);
    }

    let collections: HashMap<TypeKey, &'static str> =
        maps.values().map(|m| (m.type_key, m.collection)).collect();
    let depend = DependencyMap::compile(&graphs, &collections);

    Ok(FrozenCatalog {
        version,
        maps,
        discriminators,
        graphs,
        depend,
        adhoc: RwLock::new(HashMap::new()),
    })
}
