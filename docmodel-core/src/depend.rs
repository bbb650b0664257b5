//! Compiled dependency edges between entities.
//!
//! Each denormalized reference member compiles to a [`DependencyEdge`]: the
//! source root type whose documents embed a summary of the target entity, the
//! wire path of that summary, and the path of the embedded identifier element
//! used for point queries. The consistency maintainer walks edges by target
//! to fan out fix-up jobs; cascade deletes walk the cascade subset.

use std::collections::HashMap;

use crate::member::MemberGraph;
use crate::model::TypeKey;

/// One compiled reference from documents of `source` to entity `target`.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// Root type whose documents carry the summary.
    pub source: TypeKey,
    /// Collection those documents are stored in.
    pub collection: &'static str,
    /// Wire path of the summary sub-document.
    pub wire_path: String,
    /// Wire path of the identifier element inside the summary, used to find
    /// the documents referencing a given entity.
    pub id_path: String,
    /// Referenced entity type.
    pub target: TypeKey,
    /// Whether deleting the target deletes the referencing documents.
    pub cascade_delete: bool,
}

/// The full dependency view of a frozen catalog.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    edges: Vec<DependencyEdge>,
    incoming: HashMap<TypeKey, Vec<usize>>,
    outgoing: HashMap<TypeKey, Vec<usize>>,
}

impl DependencyMap {
    pub(crate) fn compile(
        graphs: &HashMap<TypeKey, MemberGraph>,
        collections: &HashMap<TypeKey, &'static str>,
    ) -> Self {
        let mut map = DependencyMap::default();
        for graph in graphs.values() {
            let Some(collection) = collections.get(&graph.root()).copied() else {
                continue;
            };
            for member in graph.references() {
                let Some(target) = member.target_entity else {
                    continue;
                };
                let id_path = graph
                    .reference_id_member(member)
                    .map(|m| m.wire_path.clone())
                    .unwrap_or_else(|| format!("{}.id", member.wire_path));
                // The same path can surface from several schemas of one type;
                // fold duplicates into a single edge, keeping any cascade.
                if let Some(existing) = map.edges.iter_mut().find(|e| {
                    e.source == graph.root() && e.id_path == id_path && e.target == target
                }) {
                    existing.cascade_delete |= member.cascade_delete;
                    continue;
                }
                let index = map.edges.len();
                map.edges.push(DependencyEdge {
                    source: graph.root(),
                    collection,
                    wire_path: member.wire_path.clone(),
                    id_path,
                    target,
                    cascade_delete: member.cascade_delete,
                });
                map.incoming.entry(target).or_default().push(index);
                map.outgoing.entry(graph.root()).or_default().push(index);
            }
        }
        map
    }

    /// All compiled edges.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges whose documents embed summaries of `target`.
    pub fn incoming(&self, target: TypeKey) -> impl Iterator<Item = &DependencyEdge> {
        self.incoming
            .get(&target)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Incoming edges that cascade deletes of `target`.
    pub fn cascade_incoming(&self, target: TypeKey) -> impl Iterator<Item = &DependencyEdge> {
        self.incoming(target).filter(|edge| edge.cascade_delete)
    }

    /// Edges originating from documents of `source`.
    pub fn outgoing(&self, source: TypeKey) -> impl Iterator<Item = &DependencyEdge> {
        self.outgoing
            .get(&source)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Identifier paths of every reference embedded in documents of `source`,
    /// in compilation order. The index planner derives sparse reference
    /// indexes from these.
    pub fn reference_id_paths(&self, source: TypeKey) -> Vec<&str> {
        self.outgoing(source).map(|e| e.id_path.as_str()).collect()
    }
}
