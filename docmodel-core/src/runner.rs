//! The consumed background task-runner interface.
//!
//! Denormalized-copy fix-ups and whole-collection migrations run outside the
//! request path. The mapping layer only describes the work; a [`TaskRunner`]
//! implementation owns scheduling, retries, and execution. Dropping the
//! future returned by an enqueue call before it completes abandons the
//! enqueue; there is no separate cancellation signal.

use async_trait::async_trait;

use bson::Uuid;

use crate::error::MappingResult;

/// One unit of denormalized-copy maintenance: refresh the summaries of
/// `model_id` embedded in documents of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixUpJob {
    /// Collection whose documents embed the stale summaries.
    pub collection: String,
    /// Identifier of the entity whose summaries must be refreshed.
    pub model_id: Uuid,
    /// Identifier paths locating the summaries, sorted and deduplicated so
    /// equal workloads compare equal.
    pub id_paths: Vec<String>,
}

impl FixUpJob {
    /// Creates a job, normalizing the path set.
    pub fn new(
        collection: impl Into<String>,
        model_id: Uuid,
        mut id_paths: Vec<String>,
    ) -> Self {
        id_paths.sort();
        id_paths.dedup();
        Self {
            collection: collection.into(),
            model_id,
            id_paths,
        }
    }
}

/// Object-safe async interface to the background task queue.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Enqueues one summary fix-up job.
    async fn enqueue_fix_up(&self, job: FixUpJob) -> MappingResult<()>;

    /// Enqueues a whole-collection migration pass: re-decode and re-encode
    /// every document so fix-up hooks and the active schema apply.
    async fn enqueue_migrate_collection(&self, collection: &str) -> MappingResult<()>;
}
