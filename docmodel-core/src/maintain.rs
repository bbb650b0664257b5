//! Denormalized-reference consistency maintenance.
//!
//! When an entity changes, every document embedding a summary of it holds a
//! stale copy. The maintainer walks the compiled dependency map by target and
//! enqueues one [`FixUpJob`] per affected collection, with the identifier
//! paths of every edge into that collection folded into the job.

use std::collections::HashMap;
use std::sync::Arc;

use bson::Uuid;
use tracing::debug;

use crate::catalog::FrozenCatalog;
use crate::error::{MappingError, MappingResult};
use crate::model::{Model, TypeKey};
use crate::runner::{FixUpJob, TaskRunner};

/// Fans entity updates out into background fix-up jobs.
pub struct ConsistencyMaintainer {
    catalog: Arc<FrozenCatalog>,
    runner: Arc<dyn TaskRunner>,
}

impl ConsistencyMaintainer {
    /// Creates a maintainer over a frozen catalog and a task runner.
    pub fn new(catalog: Arc<FrozenCatalog>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { catalog, runner }
    }

    /// Enqueues fix-up jobs for every collection whose documents embed a
    /// summary of the updated entity. Returns the number of jobs enqueued;
    /// zero when nothing references the type.
    pub async fn on_updated_model(&self, target: TypeKey, id: Uuid) -> MappingResult<usize> {
        let mut by_collection: HashMap<&'static str, Vec<String>> = HashMap::new();
        for edge in self.catalog.dependencies().incoming(target) {
            by_collection
                .entry(edge.collection)
                .or_default()
                .push(edge.id_path.clone());
        }
        let jobs = by_collection.len();
        for (collection, id_paths) in by_collection {
            debug!(
                target_type = target.name(),
                collection,
                paths = id_paths.len(),
                "enqueueing summary fix-up"
            );
            self.runner
                .enqueue_fix_up(FixUpJob::new(collection, id, id_paths))
                .await?;
        }
        Ok(jobs)
    }

    /// Like [`ConsistencyMaintainer::on_updated_model`], but skips the
    /// fan-out entirely when none of the changed fields are declared in any
    /// of the entity's schemas. Summaries copy declared fields, and those
    /// written under a legacy schema still hold that schema's fields, so
    /// every reachable shape counts. Changes confined to undeclared or
    /// identifier fields leave no referrer stale.
    pub async fn on_updated_fields(
        &self,
        target: TypeKey,
        id: Uuid,
        changed_fields: &[&str],
    ) -> MappingResult<usize> {
        let map = self.catalog.model_map(target)?;
        let summary_stale = changed_fields.iter().any(|name| {
            map.schemas().any(|schema| {
                schema
                    .shape
                    .field(name)
                    .is_some_and(|field| !field.identifier)
            })
        });
        if !summary_stale {
            debug!(
                target_type = target.name(),
                "no summarized field changed, skipping fix-up"
            );
            return Ok(0);
        }
        self.on_updated_model(target, id).await
    }

    /// Typed convenience over [`ConsistencyMaintainer::on_updated_model`].
    ///
    /// # Errors
    ///
    /// Fails when the model carries no identifier; non-entities have no
    /// summaries to maintain.
    pub async fn on_updated<M: Model>(&self, model: &M) -> MappingResult<usize> {
        let id = model.id().ok_or_else(|| {
            MappingError::Configuration(format!(
                "{} has no identifier to maintain summaries for",
                TypeKey::of::<M>().name()
            ))
        })?;
        self.on_updated_model(TypeKey::of::<M>(), id).await
    }
}
