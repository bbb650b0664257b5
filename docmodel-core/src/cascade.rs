//! Cascade deletes through the compiled dependency map.
//!
//! Deleting an entity deletes every document that declared a cascading
//! reference to it, recursively. Failures while deleting dependents are
//! logged and suppressed so one broken branch cannot wedge the whole
//! cascade; only a failure to delete the requested root propagates.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use bson::{Bson, Uuid};
use tracing::warn;

use crate::catalog::FrozenCatalog;
use crate::driver::StoreDriver;
use crate::error::{MappingError, MappingResult};
use crate::model::{TypeKey, uuid_from_bson};

/// Deletes the entity and, transitively, every document holding a cascading
/// reference to it. Returns the total number of documents deleted.
///
/// # Errors
///
/// Fails when the root type is not registered or its own delete fails;
/// dependent-branch failures are logged and skipped.
pub async fn cascade_delete(
    catalog: &FrozenCatalog,
    driver: &dyn StoreDriver,
    root: TypeKey,
    id: Uuid,
) -> MappingResult<u64> {
    let mut visited = HashSet::new();
    delete_recursive(catalog, driver, root, id, &mut visited, true).await
}

type DeleteFuture<'a> = Pin<Box<dyn Future<Output = MappingResult<u64>> + Send + 'a>>;

fn delete_recursive<'a>(
    catalog: &'a FrozenCatalog,
    driver: &'a dyn StoreDriver,
    root: TypeKey,
    id: Uuid,
    visited: &'a mut HashSet<(TypeKey, Uuid)>,
    is_root: bool,
) -> DeleteFuture<'a> {
    Box::pin(async move {
        // Mutual cascades terminate here.
        if !visited.insert((root, id)) {
            return Ok(0);
        }
        let mut deleted = 0;
        let edges: Vec<_> = catalog.dependencies().cascade_incoming(root).cloned().collect();
        for edge in edges {
            let dependents = match driver
                .find_by_path(edge.collection, &edge.id_path, Bson::from(id))
                .await
            {
                Ok(docs) => docs,
                Err(err) => {
                    warn!(
                        collection = edge.collection,
                        path = %edge.id_path,
                        error = %err,
                        "skipping cascade branch: dependent lookup failed"
                    );
                    continue;
                }
            };
            let Some(id_path) = catalog
                .member_graph(edge.source)
                .and_then(|g| g.identifier())
                .map(|m| m.wire_path.clone())
            else {
                continue;
            };
            for doc in dependents {
                let dep_id = match doc.get(&id_path).map(uuid_from_bson) {
                    Some(Ok(dep_id)) => dep_id,
                    _ => {
                        warn!(
                            collection = edge.collection,
                            "skipping dependent without a readable identifier"
                        );
                        continue;
                    }
                };
                match delete_recursive(catalog, driver, edge.source, dep_id, visited, false).await
                {
                    Ok(n) => deleted += n,
                    Err(err) => {
                        warn!(
                            collection = edge.collection,
                            dependent = %dep_id,
                            error = %err,
                            "skipping cascade branch: dependent delete failed"
                        );
                    }
                }
            }
        }
        let collection = catalog
            .collection_of(root)
            .ok_or_else(|| MappingError::NotRegistered(root.name().to_string()))?;
        match driver.delete_documents(collection, &[id]).await {
            Ok(n) => deleted += n,
            Err(err) if !is_root => {
                warn!(collection, entity = %id, error = %err, "dependent delete failed");
            }
            Err(err) => return Err(err),
        }
        Ok(deleted)
    })
}
