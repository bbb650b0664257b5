//! Model maps and versioned schemas.
//!
//! A [`ModelMapSchema`] is one versioned wire shape for a type. A
//! [`ModelMap`] bundles a type's active schema, zero or more secondary
//! (legacy) schemas, and an optional fallback used for unrecognized legacy
//! data. Maps are assembled through [`ModelMapBuilder`] during startup
//! registration and become immutable once the catalog freezes.

use std::fmt;
use std::sync::Arc;

use crate::catalog::SchemaCatalog;
use crate::discriminator::DiscriminatorConvention;
use crate::error::{MappingError, MappingResult};
use crate::model::{AnyModel, Model, TypeKey};
use crate::serializer::{SerdeSerializer, SerializerRef};
use crate::shape::Shape;
use crate::version::DocumentVersion;

/// Post-decode fix-up hook, invoked with the decoded model and the version
/// tag its document was written under. Hooks are synchronous; genuinely
/// asynchronous migration work belongs to the task runner's
/// migrate-collection job.
pub type FixUpHook =
    Arc<dyn Fn(&mut dyn AnyModel, Option<&DocumentVersion>) -> MappingResult<()> + Send + Sync>;

/// One versioned wire shape of a model type.
///
/// Immutable once the catalog is frozen. `base_schema_id` is resolved during
/// the freeze transition's base-map linking step.
#[derive(Clone)]
pub struct ModelMapSchema {
    /// Stable schema identifier, unique within its model map.
    pub id: String,
    /// Id of the base type's schema this one extends, linked at freeze.
    pub base_schema_id: Option<String>,
    /// Declarative shape driving encode/decode and graph compilation.
    pub shape: Shape,
    /// Serializer converting between the current type and this wire shape.
    pub serializer: SerializerRef,
    /// True iff the shape declares an identifier field.
    pub is_entity: bool,
}

impl fmt::Debug for ModelMapSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMapSchema")
            .field("id", &self.id)
            .field("base_schema_id", &self.base_schema_id)
            .field("is_entity", &self.is_entity)
            .field("fields", &self.shape.fields().len())
            .finish()
    }
}

/// The frozen mapping of one model type: active schema, legacy schemas, and
/// fallback handling for unrecognized wire data.
#[derive(Clone)]
pub struct ModelMap {
    /// Runtime type this map describes.
    pub type_key: TypeKey,
    /// Collection documents of this type are root-stored in.
    pub collection: &'static str,
    /// Abstract types are never directly encodable.
    pub is_abstract: bool,
    /// Declared base type, if any.
    pub base: Option<TypeKey>,
    /// Discriminator tag registered for this type.
    pub discriminator: Option<String>,
    /// The current forward-writing schema.
    pub active: Arc<ModelMapSchema>,
    /// Read-only legacy schemas, resolvable by id during decode.
    pub secondary: Vec<Arc<ModelMapSchema>>,
    /// Schema used when a wire schema id is unrecognized and no fallback
    /// serializer is registered.
    pub fallback_schema: Option<Arc<ModelMapSchema>>,
    /// Serializer consulted first for unrecognized wire schema ids.
    pub fallback_serializer: Option<SerializerRef>,
    /// Post-decode migration hook.
    pub fix_up: Option<FixUpHook>,
    /// True when this map was materialized during base-map linking rather
    /// than registered explicitly.
    pub generated: bool,
}

impl ModelMap {
    /// Looks up a schema (active or secondary) by id.
    pub fn schema(&self, id: &str) -> Option<&Arc<ModelMapSchema>> {
        if self.active.id == id {
            return Some(&self.active);
        }
        self.secondary.iter().find(|s| s.id == id)
    }

    /// Iterates every concrete schema reachable for this type: active,
    /// secondary, and fallback. Legacy documents may still carry any of
    /// these shapes.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<ModelMapSchema>> {
        std::iter::once(&self.active)
            .chain(self.secondary.iter())
            .chain(self.fallback_schema.iter())
    }
}

impl fmt::Debug for ModelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMap")
            .field("type", &self.type_key.name())
            .field("collection", &self.collection)
            .field("is_abstract", &self.is_abstract)
            .field("base", &self.base.map(|b| b.name()))
            .field("discriminator", &self.discriminator)
            .field("active", &self.active)
            .field("secondary", &self.secondary)
            .field("fallback_schema", &self.fallback_schema)
            .field("generated", &self.generated)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct PendingSchema {
    pub id: String,
    pub shape: Shape,
    pub serializer: SerializerRef,
}

#[derive(Clone)]
pub(crate) struct BaseLink {
    pub key: TypeKey,
    /// Materializes a default pending map for the base type when it was
    /// never registered explicitly. Captured at registration time because
    /// the base's concrete type is only available there.
    pub materialize: Arc<dyn Fn() -> PendingMap + Send + Sync>,
}

/// A model map under construction, held by the catalog until freeze.
#[derive(Clone)]
pub(crate) struct PendingMap {
    pub type_key: TypeKey,
    pub collection: &'static str,
    pub is_abstract: bool,
    pub base: Option<BaseLink>,
    pub explicit_base_schema_id: Option<String>,
    pub discriminator: Option<String>,
    pub convention: Option<DiscriminatorConvention>,
    pub active: PendingSchema,
    pub secondary: Vec<PendingSchema>,
    pub fallback_schema: Option<PendingSchema>,
    pub fallback_serializer: Option<SerializerRef>,
    pub fix_up: Option<FixUpHook>,
    pub generated: bool,
}

impl PendingMap {
    pub(crate) fn generated_for<B: Model>() -> Self {
        let key = TypeKey::of::<B>();
        PendingMap {
            type_key: key,
            collection: B::collection_name(),
            is_abstract: false,
            base: None,
            explicit_base_schema_id: None,
            discriminator: None,
            convention: None,
            active: PendingSchema {
                id: format!("auto:{}", key.short_name()),
                shape: Shape::empty(),
                serializer: SerdeSerializer::<B>::shared(),
            },
            secondary: Vec::new(),
            fallback_schema: None,
            fallback_serializer: None,
            fix_up: None,
            generated: true,
        }
    }

    /// Schema ids must be unique within one map.
    pub(crate) fn check_unique_ids(&self) -> MappingResult<()> {
        let mut seen = vec![self.active.id.as_str()];
        let ids = self
            .secondary
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.fallback_schema.iter().map(|s| s.id.as_str()));
        for id in ids {
            if seen.contains(&id) {
                return Err(MappingError::DuplicateSchemaId(
                    id.to_string(),
                    self.type_key.name().to_string(),
                ));
            }
            seen.push(id);
        }
        Ok(())
    }
}

/// Builder returned by [`SchemaCatalog::add_schema`]; collects the versioned
/// schemas, inheritance link, discriminator, and fix-up hook of one model
/// type, then commits them with [`ModelMapBuilder::register`].
pub struct ModelMapBuilder<'a, T: Model> {
    catalog: &'a SchemaCatalog,
    pending: PendingMap,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<'a, T: Model> ModelMapBuilder<'a, T> {
    pub(crate) fn new(
        catalog: &'a SchemaCatalog,
        active_schema_id: impl Into<String>,
        shape: Shape,
        serializer: Option<SerializerRef>,
    ) -> Self {
        let pending = PendingMap {
            type_key: TypeKey::of::<T>(),
            collection: T::collection_name(),
            is_abstract: false,
            base: None,
            explicit_base_schema_id: None,
            discriminator: None,
            convention: None,
            active: PendingSchema {
                id: active_schema_id.into(),
                shape,
                serializer: serializer.unwrap_or_else(SerdeSerializer::<T>::shared),
            },
            secondary: Vec::new(),
            fallback_schema: None,
            fallback_serializer: None,
            fix_up: None,
            generated: false,
        };
        Self {
            catalog,
            pending,
            _marker: std::marker::PhantomData,
        }
    }

    /// Adds a secondary (legacy) schema decoded through plain serde mapping.
    pub fn secondary_schema(self, id: impl Into<String>, shape: Shape) -> Self {
        self.secondary_schema_with(id, shape, SerdeSerializer::<T>::shared())
    }

    /// Adds a secondary (legacy) schema with a custom serializer that maps
    /// the old wire shape into the current type.
    pub fn secondary_schema_with(
        mut self,
        id: impl Into<String>,
        shape: Shape,
        serializer: SerializerRef,
    ) -> Self {
        self.pending.secondary.push(PendingSchema {
            id: id.into(),
            shape,
            serializer,
        });
        self
    }

    /// Registers the fallback schema used for documents whose wire schema id
    /// is unrecognized (consulted after the fallback serializer).
    pub fn fallback_schema(self, id: impl Into<String>, shape: Shape) -> Self {
        self.fallback_schema_with(id, shape, SerdeSerializer::<T>::shared())
    }

    /// Registers the fallback schema with a custom serializer.
    pub fn fallback_schema_with(
        mut self,
        id: impl Into<String>,
        shape: Shape,
        serializer: SerializerRef,
    ) -> Self {
        self.pending.fallback_schema = Some(PendingSchema {
            id: id.into(),
            shape,
            serializer,
        });
        self
    }

    /// Registers the fallback serializer, the first resolution step for
    /// documents whose wire schema id is unrecognized.
    pub fn fallback_serializer(mut self, serializer: SerializerRef) -> Self {
        self.pending.fallback_serializer = Some(serializer);
        self
    }

    /// Registers the discriminator tag for this type.
    pub fn discriminator(mut self, tag: impl Into<String>) -> Self {
        self.pending.discriminator = Some(tag.into());
        self
    }

    /// Overrides the discriminator convention for this type and its
    /// descendants.
    pub fn convention(mut self, convention: DiscriminatorConvention) -> Self {
        self.pending.convention = Some(convention);
        self
    }

    /// Declares `B` as this type's base type. If `B` is never registered
    /// explicitly, a default model map with a generated schema id is
    /// materialized for it during freeze.
    pub fn base<B: Model>(mut self) -> Self {
        self.pending.base = Some(BaseLink {
            key: TypeKey::of::<B>(),
            materialize: Arc::new(PendingMap::generated_for::<B>),
        });
        self
    }

    /// Pins the base schema id instead of defaulting to the base map's
    /// active schema.
    pub fn base_schema(mut self, id: impl Into<String>) -> Self {
        self.pending.explicit_base_schema_id = Some(id.into());
        self
    }

    /// Marks this type abstract: it participates in inheritance and
    /// discriminator resolution but is never directly encodable.
    pub fn abstract_type(mut self) -> Self {
        self.pending.is_abstract = true;
        self
    }

    /// Registers a typed post-decode fix-up hook, invoked with the version
    /// tag the document was written under.
    pub fn fix_up<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T, Option<&DocumentVersion>) -> MappingResult<()> + Send + Sync + 'static,
    {
        self.pending.fix_up = Some(Arc::new(
            move |model: &mut dyn AnyModel, version: Option<&DocumentVersion>| {
                let typed = model.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
                    MappingError::Configuration(format!(
                        "fix-up hook for {} received a different type",
                        TypeKey::of::<T>()
                    ))
                })?;
                hook(typed, version)
            },
        ));
        self
    }

    /// Commits the map to the catalog.
    ///
    /// # Errors
    ///
    /// Fails fast on duplicate schema ids, duplicate type registration, or
    /// registration after freeze.
    pub fn register(self) -> MappingResult<()> {
        self.pending.check_unique_ids()?;
        self.catalog.commit(self.pending)
    }
}
