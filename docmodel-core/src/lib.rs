//! An object-document mapping layer for document stores: schema catalog,
//! multi-version codecs, and a compiled dependency graph driving cascade
//! deletes and denormalized-reference consistency.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Model traits** ([`model`]) - Core traits for defining and serializing models
//! - **Shapes** ([`shape`]) - Declarative field descriptions driving the catalog
//! - **Schemas** ([`schema`]) - Versioned wire shapes and the model-map builder
//! - **Schema catalog** ([`catalog`]) - Registration and the freeze transition
//! - **Discriminators** ([`discriminator`]) - Polymorphic type-tag resolution
//! - **Member graphs** ([`member`]) - The flattened wire-path view of a root type
//! - **Dependency map** ([`depend`]) - Compiled edges between referencing entities
//! - **Codecs** ([`codec`]) - Version stamping, schema resolution, reference summaries
//! - **Decode scopes** ([`scope`]) - Per-operation identity caching and summary merging
//! - **Reference handles** ([`handle`]) - Lazy access to referenced entities
//! - **Index planning** ([`index`]) - Deterministic index specs from the catalog
//! - **Store drivers** ([`driver`]) - The consumed document-store interface
//! - **Task runners** ([`runner`]) - The consumed background-queue interface
//! - **Consistency maintenance** ([`maintain`]) - Fix-up fan-out for stale summaries
//! - **Cascade deletes** ([`cascade`]) - Recursive deletes through the dependency map
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::catalog::SchemaCatalog;
//! use docmodel_core::codec::VersionCodec;
//! use docmodel_core::model::Model;
//! use docmodel_core::shape::Shape;
//! use docmodel_core::version::DocumentVersion;
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: Uuid,
//!     pub name: String,
//! }
//!
//! impl Model for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//!
//!     fn id(&self) -> Option<Uuid> {
//!         Some(self.id)
//!     }
//! }
//!
//! let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
//! catalog
//!     .add_schema::<User>("user-v1", Shape::builder().identifier("id").scalar("name").build())
//!     .register()?;
//! let codec = VersionCodec::new(catalog.freeze()?);
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod cascade;
pub mod catalog;
pub mod codec;
pub mod depend;
pub mod discriminator;
pub mod driver;
pub mod error;
pub mod handle;
pub mod index;
pub mod maintain;
pub mod member;
pub mod model;
pub mod runner;
pub mod schema;
pub mod scope;
pub mod serializer;
pub mod shape;
pub mod version;
