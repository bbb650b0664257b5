//! Error types and result types for mapping-layer operations.
//!
//! This module provides error handling for catalog configuration, codec
//! operations, and the consumed store-driver/task-runner interfaces.
//! Use [`MappingResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the mapping layer.
///
/// Configuration errors (duplicate ids, registration after freeze, cyclic
/// member paths) fail fast at registration or freeze time and are never
/// retried. Decode errors for unknown or ambiguous discriminators are fatal;
/// the codec never guesses an intended type.
#[derive(Error, Debug)]
pub enum MappingError {
    /// Invalid or inconsistent configuration detected at registration or freeze time.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A registration call arrived after the catalog was frozen.
    #[error("Catalog is frozen; cannot register {0}")]
    FrozenCatalog(String),
    /// Two schemas with the same id were registered for one model type.
    /// The first argument is the schema id, the second the type name.
    #[error("Duplicate schema id {0} for type {1}")]
    DuplicateSchemaId(String, String),
    /// The requested model type has no registered model map.
    #[error("Type not registered: {0}")]
    NotRegistered(String),
    /// A member-map path loops back onto itself without crossing an entity
    /// boundary. Carries the full offending field chain.
    #[error("Cyclic member definition: {0}")]
    CyclicDefinition(String),
    /// A discriminator tag read from the wire matched no registered type
    /// assignable to the nominal type.
    #[error("Unknown discriminator {0} for nominal type {1}")]
    UnknownDiscriminator(String, String),
    /// A discriminator tag matched more than one registered type assignable
    /// to the nominal type.
    #[error("Ambiguous discriminator {0} for nominal type {1}")]
    AmbiguousDiscriminator(String, String),
    /// Serialization/deserialization error when converting between model and
    /// wire formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A wire document could not be decoded into a model instance.
    #[error("Decode error: {0}")]
    Decode(String),
    /// A point lookup found nothing. The first argument is the identifier,
    /// the second the collection name.
    #[error("Document not found {0} in collection {1}")]
    NotFound(String, String),
    /// An identifier element was present but could not be parsed.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),
    /// An error surfaced by the underlying document-store driver.
    #[error("Driver error: {0}")]
    Driver(String),
    /// An error surfaced by the background task runner.
    #[error("Task queue error: {0}")]
    TaskQueue(String),
}

impl MappingError {
    /// True for [`MappingError::NotFound`] and
    /// [`MappingError::MalformedIdentifier`], the variants that "try"
    /// lookups convert into an empty result.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MappingError::NotFound(_, _) | MappingError::MalformedIdentifier(_)
        )
    }
}

/// A specialized `Result` type for mapping-layer operations.
pub type MappingResult<T> = Result<T, MappingError>;

impl From<BsonError> for MappingError {
    fn from(err: BsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MappingError {
    fn from(err: SerdeJsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}
