//! Main docmodel crate providing the object-document mapping layer.
//!
//! This crate is the primary entry point for users of the docmodel framework.
//! It re-exports the core types from the sub-crates and provides convenient
//! access to the in-memory driver.
//!
//! # Features
//!
//! - **Schema catalog** - Register versioned model maps at startup and freeze
//!   them into an immutable read view
//! - **Multi-version codecs** - Version-stamped documents, discriminator-based
//!   polymorphism, and graceful decoding of legacy wire shapes
//! - **Dependency graph** - Compiled reference edges driving cascade deletes
//!   and denormalized-summary consistency
//! - **Pluggable drivers** - Object-safe store and task-runner seams with an
//!   in-memory implementation for testing
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel::memory::MemoryDriver;
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
//!     fn collection_name() -> &'static str { "users" }
//!     fn id(&self) -> Option<Uuid> { Some(self.id) }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
//!     catalog
//!         .add_schema::<User>(
//!             "user-v1",
//!             Shape::builder().identifier("id").scalar("name").build(),
//!         )
//!         .register()?;
//!     let frozen = catalog.freeze()?;
//!
//!     let codec = VersionCodec::new(frozen);
//!     let driver = MemoryDriver::new();
//!
//!     let user = User { id: Uuid::new(), name: "Alice".to_string() };
//!     let doc = codec.encode_root(&user)?;
//!     driver.insert_documents("users", vec![(user.id, doc)]).await?;
//!
//!     let stored = driver.get_document("users", user.id).await?;
//!     let loaded: User = codec.decode_root_as(stored)?;
//!     assert_eq!(loaded.name, "Alice");
//!
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub use docmodel_core::{
    cascade, catalog, codec, depend, discriminator, driver, error, handle, index, maintain,
    member, model, runner, schema, scope, serializer, shape, version,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use docmodel_memory::{MemoryDriver, RecordingTaskRunner};
}
