//! Member graphs: the flattened wire-path view of a root type.
//!
//! At freeze time every root type's active shape is walked into a
//! [`MemberGraph`]: one [`MemberMap`] per reachable wire path, including the
//! paths inside embedded sub-documents and inside the denormalized summaries
//! of referenced entities. The dependency compiler and the index planner both
//! read member graphs instead of re-walking shapes.
//!
//! The walk recurses through embedded documents, array elements, and map
//! values. Entity boundaries bound it: a reference to a type already on the
//! walk stack is recorded without recursing (self-referencing entities are
//! legal), while an embedded sub-document cycle that never crosses an entity
//! boundary is a configuration error.

use std::collections::HashMap;

use crate::error::{MappingError, MappingResult};
use crate::model::TypeKey;
use crate::shape::{FieldKind, Shape};

/// One reachable wire path of a root type.
#[derive(Debug, Clone)]
pub struct MemberMap {
    /// Declared field name (last path segment before any container segment).
    pub field_name: String,
    /// Id of the schema whose shape declared this field.
    pub schema_id: String,
    /// Root type whose documents contain this path.
    pub root_type: TypeKey,
    /// Full dotted wire path from the document root.
    pub wire_path: String,
    /// Human-readable `Type.field` chain for diagnostics.
    pub field_chain: String,
    /// True for the identifier field of an entity.
    pub is_identifier: bool,
    /// True when this member is a reference to an entity other than the
    /// document root (entity depth two or deeper).
    pub is_entity_reference: bool,
    /// True when deleting the referenced entity cascades to the owner.
    pub cascade_delete: bool,
    /// Number of entity boundaries crossed to reach this member; the root
    /// entity is depth one.
    pub entity_depth: usize,
    /// Wire path of the nearest enclosing entity's identifier.
    pub owner_entity_id_path: Option<String>,
    /// Referenced entity type for reference members.
    pub target_entity: Option<TypeKey>,
}

/// The compiled member view of one root type.
#[derive(Debug, Clone)]
pub struct MemberGraph {
    root: TypeKey,
    members: Vec<MemberMap>,
}

impl MemberGraph {
    /// The root type this graph was compiled for.
    pub fn root(&self) -> TypeKey {
        self.root
    }

    /// All members in walk order.
    pub fn members(&self) -> &[MemberMap] {
        &self.members
    }

    /// The member at an exact wire path, if any.
    pub fn member_at(&self, wire_path: &str) -> Option<&MemberMap> {
        self.members.iter().find(|m| m.wire_path == wire_path)
    }

    /// The root entity's own identifier member, if the root is an entity.
    pub fn identifier(&self) -> Option<&MemberMap> {
        self.members
            .iter()
            .find(|m| m.is_identifier && m.entity_depth == 1)
    }

    /// All reference members, at any depth.
    pub fn references(&self) -> impl Iterator<Item = &MemberMap> {
        self.members.iter().filter(|m| m.target_entity.is_some())
    }

    /// The identifier member embedded directly under a reference member's
    /// summary sub-document.
    pub fn reference_id_member(&self, reference: &MemberMap) -> Option<&MemberMap> {
        let prefix = format!("{}.", reference.wire_path);
        self.members.iter().find(|m| {
            m.is_identifier
                && m.entity_depth == reference.entity_depth
                && m.wire_path
                    .strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('.'))
        })
    }
}

/// Shape lookup used during compilation, keyed by type. Each entry lists a
/// type's schemas (active first, then secondary) with their ids; legacy
/// documents may still carry any of these shapes, so all of them contribute
/// members.
pub(crate) type ShapeSource<'a> = HashMap<TypeKey, Vec<(&'a str, &'a Shape)>>;

/// Compiles the member graph of `root` from the given shape source.
///
/// # Errors
///
/// Returns [`MappingError::CyclicDefinition`] when embedded sub-documents
/// loop without crossing an entity boundary; the message carries the full
/// field chain.
pub(crate) fn compile_member_graph(
    root: TypeKey,
    source: &ShapeSource<'_>,
) -> MappingResult<MemberGraph> {
    let mut walker = Walker {
        root,
        source,
        stack: vec![root],
        chain: vec![root.short_name().to_string()],
        members: Vec::new(),
    };
    if let Some(schemas) = source.get(&root) {
        for (schema_id, shape) in schemas.clone() {
            let depth = usize::from(shape.has_identifier());
            walker.walk_shape(schema_id, shape, "", depth)?;
        }
    }
    Ok(MemberGraph {
        root,
        members: walker.members,
    })
}

struct Walker<'a> {
    root: TypeKey,
    source: &'a ShapeSource<'a>,
    stack: Vec<TypeKey>,
    chain: Vec<String>,
    members: Vec<MemberMap>,
}

impl Walker<'_> {
    fn walk_shape(
        &mut self,
        schema_id: &str,
        shape: &Shape,
        prefix: &str,
        depth: usize,
    ) -> MappingResult<()> {
        let owner_id_path = shape
            .identifier()
            .map(|field| join_path(prefix, &field.name));
        for field in shape.fields() {
            let path = join_path(prefix, &field.name);
            self.chain.push(field.name.clone());
            self.record_and_descend(schema_id, field, &path, depth, owner_id_path.as_deref())?;
            self.chain.pop();
        }
        Ok(())
    }

    fn record_and_descend(
        &mut self,
        schema_id: &str,
        field: &crate::shape::FieldDescriptor,
        path: &str,
        depth: usize,
        owner_id_path: Option<&str>,
    ) -> MappingResult<()> {
        match &field.kind {
            FieldKind::Scalar => {
                self.record(schema_id, &field.name, path, depth, owner_id_path, None, false, field.identifier);
            }
            // Arrays are multikey: the element lives at the field's own path.
            FieldKind::Array(element) => {
                self.descend_kind(schema_id, &field.name, element, path, depth, owner_id_path)?;
            }
            FieldKind::Map { value, repr } => {
                let value_path = join_path(path, repr.value_segment());
                self.descend_kind(schema_id, &field.name, value, &value_path, depth, owner_id_path)?;
            }
            FieldKind::Document(target) => {
                self.record(schema_id, &field.name, path, depth, owner_id_path, None, false, false);
                self.descend_document(*target, path, depth)?;
            }
            FieldKind::Reference {
                target,
                cascade_delete,
            } => {
                self.descend_reference(schema_id, &field.name, *target, *cascade_delete, path, depth, owner_id_path)?;
            }
        }
        Ok(())
    }

    /// Containers share the owning field's name; only the path and kind vary.
    fn descend_kind(
        &mut self,
        schema_id: &str,
        field_name: &str,
        kind: &FieldKind,
        path: &str,
        depth: usize,
        owner_id_path: Option<&str>,
    ) -> MappingResult<()> {
        match kind {
            FieldKind::Scalar => {
                self.record(schema_id, field_name, path, depth, owner_id_path, None, false, false);
            }
            FieldKind::Array(element) => {
                self.descend_kind(schema_id, field_name, element, path, depth, owner_id_path)?;
            }
            FieldKind::Map { value, repr } => {
                let value_path = join_path(path, repr.value_segment());
                self.descend_kind(schema_id, field_name, value, &value_path, depth, owner_id_path)?;
            }
            FieldKind::Document(target) => {
                self.record(schema_id, field_name, path, depth, owner_id_path, None, false, false);
                self.descend_document(*target, path, depth)?;
            }
            FieldKind::Reference {
                target,
                cascade_delete,
            } => {
                self.descend_reference(schema_id, field_name, *target, *cascade_delete, path, depth, owner_id_path)?;
            }
        }
        Ok(())
    }

    fn descend_document(&mut self, target: TypeKey, path: &str, depth: usize) -> MappingResult<()> {
        if self.stack.contains(&target) {
            self.chain.push(target.short_name().to_string());
            return Err(MappingError::CyclicDefinition(self.chain.join(" -> ")));
        }
        let Some(schemas) = self.source.get(&target) else {
            // Unregistered embedded types are opaque to the graph.
            return Ok(());
        };
        let schemas = schemas.clone();
        self.stack.push(target);
        self.chain.push(target.short_name().to_string());
        for (schema_id, shape) in schemas {
            let next_depth = depth + usize::from(shape.has_identifier());
            self.walk_shape(schema_id, shape, path, next_depth)?;
        }
        self.chain.pop();
        self.stack.pop();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn descend_reference(
        &mut self,
        schema_id: &str,
        field_name: &str,
        target: TypeKey,
        cascade_delete: bool,
        path: &str,
        depth: usize,
        owner_id_path: Option<&str>,
    ) -> MappingResult<()> {
        let target_depth = depth + 1;
        self.members.push(MemberMap {
            field_name: field_name.to_string(),
            schema_id: schema_id.to_string(),
            root_type: self.root,
            wire_path: path.to_string(),
            field_chain: self.chain.join("."),
            is_identifier: false,
            is_entity_reference: target_depth >= 2,
            cascade_delete,
            entity_depth: target_depth,
            owner_entity_id_path: owner_id_path.map(str::to_string),
            target_entity: Some(target),
        });
        // Self-references and reference cycles bound the walk; the summary of
        // an entity already on the stack adds no new paths.
        if self.stack.contains(&target) {
            return Ok(());
        }
        let Some(schemas) = self.source.get(&target) else {
            return Ok(());
        };
        let schemas = schemas.clone();
        self.stack.push(target);
        self.chain.push(target.short_name().to_string());
        for (target_schema_id, shape) in schemas {
            self.walk_shape(target_schema_id, shape, path, target_depth)?;
        }
        self.chain.pop();
        self.stack.pop();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        schema_id: &str,
        field_name: &str,
        path: &str,
        depth: usize,
        owner_id_path: Option<&str>,
        target: Option<TypeKey>,
        cascade_delete: bool,
        is_identifier: bool,
    ) {
        self.members.push(MemberMap {
            field_name: field_name.to_string(),
            schema_id: schema_id.to_string(),
            root_type: self.root,
            wire_path: path.to_string(),
            field_chain: self.chain.join("."),
            is_identifier,
            is_entity_reference: false,
            cascade_delete,
            entity_depth: depth,
            owner_entity_id_path: owner_id_path.map(str::to_string),
            target_entity: target,
        });
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::MapRepr;

    struct Post;
    struct Author;
    struct Comment;
    struct Node;

    fn source_with<'a>(entries: &[(TypeKey, &'a str, &'a Shape)]) -> ShapeSource<'a> {
        entries
            .iter()
            .map(|(key, id, shape)| (*key, vec![(*id, *shape)]))
            .collect()
    }

    #[test]
    fn reference_summaries_are_flattened() {
        let author = Shape::builder().identifier("id").scalar("name").build();
        let post = Shape::builder()
            .identifier("id")
            .scalar("title")
            .reference::<Author>("author")
            .build();
        let source = source_with(&[
            (TypeKey::of::<Post>(), "v1", &post),
            (TypeKey::of::<Author>(), "v1", &author),
        ]);
        let graph = compile_member_graph(TypeKey::of::<Post>(), &source).unwrap();

        assert_eq!(graph.identifier().unwrap().wire_path, "id");
        let reference = graph.member_at("author").unwrap();
        assert!(reference.is_entity_reference);
        assert_eq!(reference.entity_depth, 2);
        assert_eq!(reference.target_entity, Some(TypeKey::of::<Author>()));

        let nested_id = graph.reference_id_member(reference).unwrap();
        assert_eq!(nested_id.wire_path, "author.id");
        assert_eq!(nested_id.entity_depth, 2);

        let nested_name = graph.member_at("author.name").unwrap();
        assert_eq!(nested_name.owner_entity_id_path.as_deref(), Some("author.id"));
    }

    #[test]
    fn arrays_are_multikey_and_maps_add_a_value_segment() {
        let comment = Shape::builder().scalar("body").build();
        let post = Shape::builder()
            .identifier("id")
            .array("tags", FieldKind::Scalar)
            .array("comments", FieldKind::document_of::<Comment>())
            .map(
                "meta",
                FieldKind::document_of::<Comment>(),
                MapRepr::ArrayOfDocuments,
            )
            .build();
        let source = source_with(&[
            (TypeKey::of::<Post>(), "v2", &post),
            (TypeKey::of::<Comment>(), "v1", &comment),
        ]);
        let graph = compile_member_graph(TypeKey::of::<Post>(), &source).unwrap();

        assert!(graph.member_at("tags").is_some());
        assert!(graph.member_at("comments.body").is_some());
        assert!(graph.member_at("meta.v.body").is_some());
    }

    #[test]
    fn embedded_cycle_is_rejected_with_the_field_chain() {
        let node = Shape::builder()
            .scalar("label")
            .document::<Node>("child")
            .build();
        let source = source_with(&[(TypeKey::of::<Node>(), "v1", &node)]);
        let err = compile_member_graph(TypeKey::of::<Node>(), &source).unwrap_err();
        match err {
            MappingError::CyclicDefinition(chain) => {
                assert!(chain.contains("Node"), "chain: {chain}");
                assert!(chain.contains("child"), "chain: {chain}");
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn secondary_schemas_contribute_members_too() {
        let author = Shape::builder().identifier("id").build();
        let current = Shape::builder()
            .identifier("id")
            .reference::<Author>("author")
            .build();
        let legacy = Shape::builder()
            .identifier("id")
            .reference::<Author>("creator")
            .build();
        let source: ShapeSource<'_> = [
            (
                TypeKey::of::<Post>(),
                vec![("post-v2", &current), ("post-v1", &legacy)],
            ),
            (TypeKey::of::<Author>(), vec![("author-v1", &author)]),
        ]
        .into_iter()
        .collect();
        let graph = compile_member_graph(TypeKey::of::<Post>(), &source).unwrap();

        // Documents on disk may still use the old field name.
        assert_eq!(graph.member_at("author").unwrap().schema_id, "post-v2");
        assert_eq!(graph.member_at("creator").unwrap().schema_id, "post-v1");
    }

    #[test]
    fn self_reference_bounds_the_walk() {
        let node = Shape::builder()
            .identifier("id")
            .reference::<Node>("parent")
            .build();
        let source = source_with(&[(TypeKey::of::<Node>(), "v1", &node)]);
        let graph = compile_member_graph(TypeKey::of::<Node>(), &source).unwrap();
        let parent = graph.member_at("parent").unwrap();
        assert_eq!(parent.target_entity, Some(TypeKey::of::<Node>()));
        // Recorded once, not recursed forever.
        assert!(graph.member_at("parent.parent").is_none());
    }
}
