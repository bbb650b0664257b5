//! Convenient re-exports of commonly used types from docmodel.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - Model traits and the type-erased model
//! - The schema catalog, shapes, and the model-map builder
//! - The layered codecs and decode scopes
//! - Reference handles and index planning
//! - Driver and task-runner seams
//! - Error types, versions, and consistency maintenance

pub use docmodel_core::{
    cascade::cascade_delete,
    catalog::{FrozenCatalog, SchemaCatalog},
    codec::{ModelCodec, ReferenceCodec, ReferenceMode, VersionCodec},
    discriminator::{ConventionKind, DiscriminatorConvention},
    driver::{StoreDriver, StoreDriverExt},
    error::{MappingError, MappingResult},
    handle::RefHandle,
    index::{IndexSpec, ensure_indexes},
    maintain::ConsistencyMaintainer,
    model::{AnyModel, IntoAnyModel, Model, ModelExt, TypeKey},
    runner::{FixUpJob, TaskRunner},
    schema::{ModelMap, ModelMapBuilder, ModelMapSchema},
    scope::DecodeScope,
    serializer::{FnSerializer, ModelSerializer, SerdeSerializer, SerializerRef, decode_only},
    shape::{FieldDescriptor, FieldKind, MapRepr, Shape, ShapeBuilder},
    version::DocumentVersion,
};
