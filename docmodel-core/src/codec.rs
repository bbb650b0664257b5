//! The layered wire codecs.
//!
//! [`ModelCodec`] is the polymorphic core: it encodes through a type's active
//! schema, stamping the discriminator tag and the schema id, and decodes by
//! resolving the discriminator to the actual concrete type and the wire
//! schema id to the serializer that understands the document's shape.
//! [`VersionCodec`] wraps it for root-stored documents, adding the version
//! tag at position zero and running the post-decode fix-up hook.
//! [`ReferenceCodec`] produces and consumes the denormalized summary
//! sub-documents that reference fields embed.
//!
//! Decode never guesses: an unknown or ambiguous discriminator is a fatal
//! error, while an unrecognized schema id degrades gracefully through the
//! fallback serializer, the fallback schema, and finally the active schema.

use std::sync::Arc;

use bson::{Bson, Document};

use crate::catalog::FrozenCatalog;
use crate::discriminator::ConventionKind;
use crate::error::{MappingError, MappingResult};
use crate::handle::RefHandle;
use crate::model::{AnyModel, Model, TypeKey, uuid_from_bson};
use crate::schema::ModelMap;
use crate::scope::DecodeScope;
use crate::serializer::SerializerRef;
use crate::version::DocumentVersion;

/// Reserved element carrying the catalog version; always at position zero of
/// a root-stored document.
pub const VERSION_ELEMENT: &str = "_ver";

/// Reserved element carrying the id of the schema a document was written
/// under.
pub const SCHEMA_ID_ELEMENT: &str = "_sid";

/// Polymorphic encode/decode through the frozen catalog.
#[derive(Clone)]
pub struct ModelCodec {
    catalog: Arc<FrozenCatalog>,
}

impl ModelCodec {
    /// Creates a codec over a frozen catalog.
    pub fn new(catalog: Arc<FrozenCatalog>) -> Self {
        Self { catalog }
    }

    /// The catalog this codec reads.
    pub fn catalog(&self) -> &Arc<FrozenCatalog> {
        &self.catalog
    }

    /// Encodes a typed model through its active schema, auto-describing the
    /// type if it was never registered.
    pub fn encode<M: Model>(&self, model: &M) -> MappingResult<Document> {
        let map = self.catalog.model_map_of::<M>();
        self.encode_with_map(&map, model)
    }

    /// Encodes a type-erased model. The concrete type must be registered or
    /// previously auto-described.
    pub fn encode_any(&self, model: &dyn AnyModel) -> MappingResult<Document> {
        let map = self.catalog.model_map(model.type_key())?;
        self.encode_with_map(&map, model)
    }

    fn encode_with_map(&self, map: &ModelMap, model: &dyn AnyModel) -> MappingResult<Document> {
        if map.is_abstract {
            return Err(MappingError::Configuration(format!(
                "cannot encode abstract type {}",
                map.type_key.name()
            )));
        }
        let mut doc = map.active.serializer.encode(model)?;
        stamp_discriminator(&self.catalog, map.type_key, &mut doc);
        if !doc.contains_key(SCHEMA_ID_ELEMENT) {
            doc.insert(SCHEMA_ID_ELEMENT, map.active.id.clone());
        }
        Ok(doc)
    }

    /// Decodes a document stored under the nominal type, materializing the
    /// concrete type its discriminator names.
    pub fn decode(&self, nominal: TypeKey, doc: Document) -> MappingResult<Box<dyn AnyModel>> {
        self.decode_scoped(nominal, doc, None)
    }

    /// Decodes within a scope: entities with identifiers are cached so later
    /// summaries of the same entity merge against this document.
    pub fn decode_scoped(
        &self,
        nominal: TypeKey,
        mut doc: Document,
        scope: Option<&DecodeScope>,
    ) -> MappingResult<Box<dyn AnyModel>> {
        let discriminators = self.catalog.discriminators();
        let convention = discriminators.convention_for(nominal);
        let tag = take_discriminator_tag(&mut doc, &convention.element_name)?;
        let actual = discriminators.lookup_actual_type(nominal, tag.as_deref())?;
        let map = self.catalog.model_map(actual)?;
        if map.is_abstract {
            return Err(MappingError::Decode(format!(
                "document resolves to abstract type {}",
                actual.name()
            )));
        }
        let schema_id = match doc.remove(SCHEMA_ID_ELEMENT) {
            Some(Bson::String(id)) => Some(id),
            _ => None,
        };
        let serializer = resolve_serializer(&map, schema_id.as_deref());
        let raw = doc.clone();
        let model = serializer.decode(doc)?;
        if let (Some(scope), Some(id)) = (scope, model.model_id()) {
            scope.insert_full(model.type_key(), id, raw);
        }
        Ok(model)
    }

    /// Decodes a document known to hold exactly `M` (no subtype dispatch).
    ///
    /// # Errors
    ///
    /// Fails when the document's discriminator names a type other than `M`.
    pub fn decode_as<M: Model>(&self, doc: Document) -> MappingResult<M> {
        // Describe M up front so unregistered types decode through serde.
        let _ = self.catalog.model_map_of::<M>();
        let model = self.decode(TypeKey::of::<M>(), doc)?;
        downcast_owned(model)
    }
}

/// Writes the discriminator element for a discriminated type, rendered per
/// its convention. Pre-existing elements are left untouched.
fn stamp_discriminator(catalog: &FrozenCatalog, type_key: TypeKey, doc: &mut Document) {
    let discriminators = catalog.discriminators();
    if !discriminators.is_discriminated(type_key) {
        return;
    }
    let convention = discriminators.convention_for(type_key);
    if doc.contains_key(&convention.element_name) {
        return;
    }
    let tag = match convention.kind {
        ConventionKind::Scalar => discriminators.tag_of(type_key).map(Bson::String),
        ConventionKind::Hierarchy => {
            let tags = discriminators.hierarchy_tags(type_key);
            (!tags.is_empty()).then(|| Bson::Array(tags.into_iter().map(Bson::String).collect()))
        }
    };
    if let Some(tag) = tag {
        doc.insert(convention.element_name.clone(), tag);
    }
}

/// Removes the discriminator element and yields its tag. Hierarchy arrays
/// name the actual type last.
fn take_discriminator_tag(doc: &mut Document, element: &str) -> MappingResult<Option<String>> {
    match doc.remove(element) {
        None => Ok(None),
        Some(Bson::String(tag)) => Ok(Some(tag)),
        Some(Bson::Array(parts)) => Ok(parts.into_iter().rev().find_map(|part| match part {
            Bson::String(tag) => Some(tag),
            _ => None,
        })),
        Some(other) => Err(MappingError::Decode(format!(
            "invalid discriminator element {element}: {other:?}"
        ))),
    }
}

/// Schema resolution order for an incoming document: the exact schema named
/// by the wire id, then the fallback serializer, then the fallback schema,
/// and finally the active schema. Unknown and missing ids never error.
fn resolve_serializer(map: &ModelMap, schema_id: Option<&str>) -> SerializerRef {
    if let Some(id) = schema_id {
        if let Some(schema) = map.schema(id) {
            return schema.serializer.clone();
        }
        if let Some(fallback) = &map.fallback_serializer {
            return fallback.clone();
        }
        if let Some(fallback) = &map.fallback_schema {
            return fallback.serializer.clone();
        }
    }
    map.active.serializer.clone()
}

fn downcast_owned<M: Model>(model: Box<dyn AnyModel>) -> MappingResult<M> {
    let actual = model.type_key();
    model
        .as_any()
        .downcast_ref::<M>()
        .cloned()
        .ok_or_else(|| {
            MappingError::Decode(format!(
                "document decoded as {} but {} was requested",
                actual.name(),
                TypeKey::of::<M>().name()
            ))
        })
}

/// Root-document codec: version stamping plus post-decode fix-up.
#[derive(Clone)]
pub struct VersionCodec {
    codec: ModelCodec,
    version: DocumentVersion,
}

impl VersionCodec {
    /// Creates a root codec stamping the catalog's version.
    pub fn new(catalog: Arc<FrozenCatalog>) -> Self {
        Self {
            version: catalog.version().clone(),
            codec: ModelCodec::new(catalog),
        }
    }

    /// The underlying polymorphic codec.
    pub fn inner(&self) -> &ModelCodec {
        &self.codec
    }

    /// Encodes a root-stored document, version tag first.
    pub fn encode_root<M: Model>(&self, model: &M) -> MappingResult<Document> {
        Ok(self.stamp(self.codec.encode(model)?))
    }

    /// Encodes a type-erased root-stored document, version tag first.
    pub fn encode_root_any(&self, model: &dyn AnyModel) -> MappingResult<Document> {
        Ok(self.stamp(self.codec.encode_any(model)?))
    }

    // The version element must be the first element of the document.
    fn stamp(&self, doc: Document) -> Document {
        let mut out = Document::new();
        out.insert(VERSION_ELEMENT, self.version.to_bson());
        for (name, value) in doc {
            if name != VERSION_ELEMENT {
                out.insert(name, value);
            }
        }
        out
    }

    /// Decodes a root-stored document and runs the actual type's fix-up hook
    /// with the version tag the document was written under.
    pub fn decode_root(
        &self,
        nominal: TypeKey,
        doc: Document,
    ) -> MappingResult<Box<dyn AnyModel>> {
        self.decode_root_scoped(nominal, doc, None)
    }

    /// Scoped variant of [`VersionCodec::decode_root`].
    pub fn decode_root_scoped(
        &self,
        nominal: TypeKey,
        mut doc: Document,
        scope: Option<&DecodeScope>,
    ) -> MappingResult<Box<dyn AnyModel>> {
        let version = doc
            .remove(VERSION_ELEMENT)
            .map(|tag| DocumentVersion::from_bson(&tag))
            .transpose()?;
        let mut model = self.codec.decode_scoped(nominal, doc, scope)?;
        let map = self.codec.catalog.model_map(model.type_key())?;
        if let Some(hook) = &map.fix_up {
            hook(&mut *model, version.as_ref())?;
        }
        Ok(model)
    }

    /// Typed variant of [`VersionCodec::decode_root`].
    pub fn decode_root_as<M: Model>(&self, doc: Document) -> MappingResult<M> {
        let _ = self.codec.catalog.model_map_of::<M>();
        let model = self.decode_root(TypeKey::of::<M>(), doc)?;
        downcast_owned(model)
    }
}

/// How much of the referenced entity a summary carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    /// Every field the target's active shape declares.
    #[default]
    SummaryFields,
    /// Only the target's identifier.
    IdOnly,
}

/// Codec for the denormalized summary sub-documents of reference fields.
#[derive(Clone)]
pub struct ReferenceCodec {
    catalog: Arc<FrozenCatalog>,
    mode: ReferenceMode,
}

impl ReferenceCodec {
    /// Creates a reference codec with the given summary mode.
    pub fn new(catalog: Arc<FrozenCatalog>, mode: ReferenceMode) -> Self {
        Self { catalog, mode }
    }

    /// Encodes an entity into the summary its referrers embed, keeping only
    /// the fields the target's active shape declares. Discriminated targets
    /// get their tag stamped so the summary keeps the concrete type.
    ///
    /// # Errors
    ///
    /// Fails when the target type declares no identifier field.
    pub fn encode_summary(&self, model: &dyn AnyModel) -> MappingResult<Document> {
        let map = self.catalog.model_map(model.type_key())?;
        let shape = &map.active.shape;
        let identifier = shape.identifier().ok_or_else(|| {
            MappingError::Configuration(format!(
                "referenced type {} declares no identifier",
                map.type_key.name()
            ))
        })?;
        let mut full = map.active.serializer.encode(model)?;
        let mut summary = Document::new();
        match self.mode {
            ReferenceMode::IdOnly => {
                if let Some(id) = full.remove(&identifier.name) {
                    summary.insert(identifier.name.clone(), id);
                }
            }
            ReferenceMode::SummaryFields => {
                for field in shape.fields() {
                    if let Some(value) = full.remove(&field.name) {
                        summary.insert(field.name.clone(), value);
                    }
                }
            }
        }
        stamp_discriminator(&self.catalog, map.type_key, &mut summary);
        Ok(summary)
    }

    /// Decodes a summary sub-document into a [`RefHandle`], resolving the
    /// discriminator to the concrete target type and merging the summary into
    /// the scope's cached view of the entity when a scope is given. The
    /// returned handle carries the merged (richest known) summary; in id-only
    /// mode a fresh, uncached summary is reduced to the identifier element.
    pub fn decode_handle(
        &self,
        target: TypeKey,
        mut doc: Document,
        scope: Option<&DecodeScope>,
    ) -> MappingResult<RefHandle> {
        let discriminators = self.catalog.discriminators();
        let convention = discriminators.convention_for(target);
        let tag = take_discriminator_tag(&mut doc, &convention.element_name)?;
        let actual = discriminators.lookup_actual_type(target, tag.as_deref())?;
        let map = self.catalog.model_map(actual)?;
        let id_name = map
            .active
            .shape
            .identifier()
            .map(|f| f.name.clone())
            .unwrap_or_else(|| "id".to_string());
        let id_value = doc.get(&id_name).ok_or_else(|| {
            MappingError::Decode(format!(
                "reference summary of {} is missing its identifier element {id_name}",
                actual.name()
            ))
        })?;
        let id = uuid_from_bson(id_value)?;
        if self.mode == ReferenceMode::IdOnly {
            let mut trimmed = Document::new();
            if let Some(value) = doc.remove(&id_name) {
                trimmed.insert(id_name, value);
            }
            doc = trimmed;
        }
        if let Some(scope) = scope {
            scope.insert_summary(actual, id, doc.clone());
            if let Some(entry) = scope.get(actual, id) {
                return Ok(RefHandle::new(actual, id, map.collection, entry.doc));
            }
        }
        Ok(RefHandle::new(actual, id, map.collection, doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::model::ModelExt;
    use crate::serializer::decode_only;
    use crate::shape::Shape;
    use bson::{Uuid, doc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Animal {
        id: Uuid,
        name: String,
    }

    impl Model for Animal {
        fn collection_name() -> &'static str {
            "animals"
        }

        fn id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dog {
        id: Uuid,
        name: String,
        breed: String,
    }

    impl Model for Dog {
        fn collection_name() -> &'static str {
            "animals"
        }

        fn id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    fn animal_shape() -> Shape {
        Shape::builder().identifier("id").scalar("name").build()
    }

    fn dog_shape() -> Shape {
        Shape::builder()
            .identifier("id")
            .scalar("name")
            .scalar("breed")
            .build()
    }

    fn hierarchy_catalog() -> Arc<FrozenCatalog> {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v1", animal_shape())
            .discriminator("Animal")
            .register()
            .unwrap();
        catalog
            .add_schema::<Dog>("dog-v1", dog_shape())
            .base::<Animal>()
            .discriminator("Dog")
            .register()
            .unwrap();
        catalog.freeze().unwrap()
    }

    #[test]
    fn subtype_round_trips_under_its_base() {
        let codec = VersionCodec::new(hierarchy_catalog());
        let dog = Dog {
            id: Uuid::new(),
            name: "Rex".to_string(),
            breed: "Vizsla".to_string(),
        };
        let doc = codec.encode_root(&dog).unwrap();

        let mut elements = doc.keys();
        assert_eq!(elements.next().map(String::as_str), Some(VERSION_ELEMENT));
        assert_eq!(doc.get_str("_t").unwrap(), "Dog");
        assert_eq!(doc.get_str(SCHEMA_ID_ELEMENT).unwrap(), "dog-v1");

        let decoded = codec.decode_root(TypeKey::of::<Animal>(), doc).unwrap();
        assert_eq!(decoded.downcast_ref::<Dog>().unwrap(), &dog);
    }

    #[test]
    fn missing_schema_id_decodes_through_the_active_schema() {
        let codec = VersionCodec::new(hierarchy_catalog());
        let id = Uuid::new();
        let doc = doc! { "_t": "Animal", "id": id, "name": "Misu" };
        let decoded = codec.decode_root(TypeKey::of::<Animal>(), doc).unwrap();
        assert_eq!(decoded.downcast_ref::<Animal>().unwrap().name, "Misu");
    }

    #[test]
    fn unknown_schema_id_prefers_the_fallback_serializer() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(2, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v2", animal_shape())
            .fallback_serializer(decode_only(|mut doc: Document| {
                // The oldest documents spelled the name field "label".
                if let Some(label) = doc.remove("label") {
                    doc.insert("name", label);
                }
                Ok(Box::new(Animal::from_document(doc)?) as Box<dyn AnyModel>)
            }))
            .register()
            .unwrap();
        let codec = ModelCodec::new(catalog.freeze().unwrap());

        let id = Uuid::new();
        let legacy = doc! { "_sid": "animal-v0", "id": id, "label": "Misu" };
        let decoded: Animal = codec.decode_as(legacy).unwrap();
        assert_eq!(decoded.name, "Misu");

        // A recognized id bypasses the fallback entirely.
        let current = doc! { "_sid": "animal-v2", "id": id, "name": "Rex" };
        let decoded: Animal = codec.decode_as(current).unwrap();
        assert_eq!(decoded.name, "Rex");
    }

    #[test]
    fn fix_up_hook_sees_the_written_version() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(2, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v2", animal_shape())
            .fix_up(|animal: &mut Animal, version| {
                if version.is_some_and(|v| *v < DocumentVersion::new(2, 0, 0)) {
                    animal.name = animal.name.to_uppercase();
                }
                Ok(())
            })
            .register()
            .unwrap();
        let codec = VersionCodec::new(catalog.freeze().unwrap());

        let id = Uuid::new();
        let old = doc! {
            "_ver": DocumentVersion::new(1, 4, 0).to_bson(),
            "id": id,
            "name": "misu",
        };
        let migrated: Animal = codec.decode_root_as(old).unwrap();
        assert_eq!(migrated.name, "MISU");

        let fresh = Animal {
            id,
            name: "misu".to_string(),
        };
        let round = codec.encode_root(&fresh).unwrap();
        let decoded: Animal = codec.decode_root_as(round).unwrap();
        assert_eq!(decoded.name, "misu");
    }

    #[test]
    fn hierarchy_convention_writes_the_tag_chain() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v1", animal_shape())
            .discriminator("Animal")
            .convention(crate::discriminator::DiscriminatorConvention::hierarchy())
            .register()
            .unwrap();
        catalog
            .add_schema::<Dog>("dog-v1", dog_shape())
            .base::<Animal>()
            .discriminator("Dog")
            .register()
            .unwrap();
        let codec = ModelCodec::new(catalog.freeze().unwrap());

        let dog = Dog {
            id: Uuid::new(),
            name: "Rex".to_string(),
            breed: "Vizsla".to_string(),
        };
        let doc = codec.encode(&dog).unwrap();
        let tags = doc.get_array("_t").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], Bson::String("Animal".to_string()));
        assert_eq!(tags[1], Bson::String("Dog".to_string()));

        let decoded = codec.decode(TypeKey::of::<Animal>(), doc).unwrap();
        assert_eq!(decoded.downcast_ref::<Dog>().unwrap(), &dog);
    }

    #[test]
    fn abstract_types_never_encode() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v1", animal_shape())
            .abstract_type()
            .register()
            .unwrap();
        let codec = ModelCodec::new(catalog.freeze().unwrap());
        let animal = Animal {
            id: Uuid::new(),
            name: "ghost".to_string(),
        };
        assert!(matches!(
            codec.encode_any(&animal),
            Err(MappingError::Configuration(_))
        ));
    }

    #[test]
    fn summary_encoding_strips_undeclared_fields() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        // Only id and name are declared; breed stays private to the full doc.
        catalog
            .add_schema::<Dog>("dog-v1", animal_shape())
            .register()
            .unwrap();
        let frozen = catalog.freeze().unwrap();

        let dog = Dog {
            id: Uuid::new(),
            name: "Rex".to_string(),
            breed: "Vizsla".to_string(),
        };
        let refs = ReferenceCodec::new(frozen.clone(), ReferenceMode::SummaryFields);
        let summary = refs.encode_summary(&dog).unwrap();
        assert!(summary.get("breed").is_none());
        assert_eq!(summary.get_str("name").unwrap(), "Rex");

        let id_only = ReferenceCodec::new(frozen, ReferenceMode::IdOnly);
        let summary = id_only.encode_summary(&dog).unwrap();
        assert_eq!(summary.len(), 1);
        assert!(summary.get("id").is_some());
    }

    #[test]
    fn id_only_handles_carry_just_the_identifier() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v1", animal_shape())
            .register()
            .unwrap();
        let refs = ReferenceCodec::new(catalog.freeze().unwrap(), ReferenceMode::IdOnly);

        let id = Uuid::new();
        let handle = refs
            .decode_handle(
                TypeKey::of::<Animal>(),
                doc! { "id": id, "name": "Misu" },
                None,
            )
            .unwrap();
        assert_eq!(handle.id(), id);
        assert!(handle.is_loaded("id"));
        assert!(!handle.is_loaded("name"));
        assert_eq!(handle.summary().len(), 1);
    }

    #[test]
    fn summaries_keep_the_concrete_type() {
        let refs = ReferenceCodec::new(hierarchy_catalog(), ReferenceMode::SummaryFields);
        let dog = Dog {
            id: Uuid::new(),
            name: "Rex".to_string(),
            breed: "Vizsla".to_string(),
        };
        let summary = refs.encode_summary(&dog).unwrap();
        assert_eq!(summary.get_str("_t").unwrap(), "Dog");

        // Referenced under the base type, the handle resolves to the subtype.
        let handle = refs
            .decode_handle(TypeKey::of::<Animal>(), summary, None)
            .unwrap();
        assert_eq!(handle.target(), TypeKey::of::<Dog>());
        assert_eq!(handle.id(), dog.id);
        assert!(!handle.is_loaded("_t"));
    }

    #[test]
    fn scoped_handles_serve_the_merged_view() {
        let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
        catalog
            .add_schema::<Animal>("animal-v1", animal_shape())
            .register()
            .unwrap();
        let refs = ReferenceCodec::new(catalog.freeze().unwrap(), ReferenceMode::SummaryFields);

        let scope = DecodeScope::new();
        let id = Uuid::new();
        let first = refs
            .decode_handle(
                TypeKey::of::<Animal>(),
                doc! { "id": id, "name": "Misu" },
                Some(&scope),
            )
            .unwrap();
        assert!(first.is_loaded("name"));
        assert!(!first.is_loaded("age"));

        let second = refs
            .decode_handle(
                TypeKey::of::<Animal>(),
                doc! { "id": id, "age": 3 },
                Some(&scope),
            )
            .unwrap();
        assert_eq!(second.summary().get_str("name").unwrap(), "Misu");
        assert_eq!(second.summary().get_i32("age").unwrap(), 3);
    }
}
