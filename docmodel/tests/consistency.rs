//! Dependency-graph behavior end to end: fix-up fan-out for stale summaries,
//! recursive cascade deletes with branch suppression, and index planning.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, Uuid, doc};
use serde::{Deserialize, Serialize};

use docmodel::memory::{MemoryDriver, RecordingTaskRunner};
use docmodel::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Author {
    id: Uuid,
    name: String,
}

impl Model for Author {
    fn collection_name() -> &'static str {
        "authors"
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AuthorSummary {
    id: Uuid,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Post {
    id: Uuid,
    title: String,
    author: AuthorSummary,
}

impl Model for Post {
    fn collection_name() -> &'static str {
        "posts"
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PostSummary {
    id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Comment {
    id: Uuid,
    body: String,
    post: PostSummary,
}

impl Model for Comment {
    fn collection_name() -> &'static str {
        "comments"
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Audit {
    id: Uuid,
    actor: AuthorSummary,
}

impl Model for Audit {
    fn collection_name() -> &'static str {
        "audits"
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

fn author_shape() -> Shape {
    Shape::builder().identifier("id").scalar("name").build()
}

fn cascade_catalog() -> Arc<FrozenCatalog> {
    let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
    catalog
        .add_schema::<Author>("author-v1", author_shape())
        .register()
        .unwrap();
    catalog
        .add_schema::<Post>(
            "post-v1",
            Shape::builder()
                .identifier("id")
                .scalar("title")
                .cascade_reference::<Author>("author")
                .build(),
        )
        .register()
        .unwrap();
    catalog
        .add_schema::<Comment>(
            "comment-v1",
            Shape::builder()
                .identifier("id")
                .scalar("body")
                .cascade_reference::<Post>("post")
                .build(),
        )
        .register()
        .unwrap();
    catalog
        .add_schema::<Audit>(
            "audit-v1",
            Shape::builder()
                .identifier("id")
                .reference::<Author>("actor")
                .build(),
        )
        .register()
        .unwrap();
    catalog.freeze().unwrap()
}

struct Fixture {
    frozen: Arc<FrozenCatalog>,
    codec: VersionCodec,
    driver: MemoryDriver,
    author: Author,
    post: Post,
    comment: Comment,
    audit: Audit,
}

async fn seed(driver: MemoryDriver) -> Fixture {
    let frozen = cascade_catalog();
    let codec = VersionCodec::new(frozen.clone());
    let author = Author {
        id: Uuid::new(),
        name: "Ada".to_string(),
    };
    let post = Post {
        id: Uuid::new(),
        title: "On graphs".to_string(),
        author: AuthorSummary {
            id: author.id,
            name: author.name.clone(),
        },
    };
    let comment = Comment {
        id: Uuid::new(),
        body: "nice".to_string(),
        post: PostSummary { id: post.id },
    };
    let audit = Audit {
        id: Uuid::new(),
        actor: AuthorSummary {
            id: author.id,
            name: author.name.clone(),
        },
    };
    driver
        .insert_documents(
            "authors",
            vec![(author.id, codec.encode_root(&author).unwrap())],
        )
        .await
        .unwrap();
    driver
        .insert_documents("posts", vec![(post.id, codec.encode_root(&post).unwrap())])
        .await
        .unwrap();
    driver
        .insert_documents(
            "comments",
            vec![(comment.id, codec.encode_root(&comment).unwrap())],
        )
        .await
        .unwrap();
    driver
        .insert_documents(
            "audits",
            vec![(audit.id, codec.encode_root(&audit).unwrap())],
        )
        .await
        .unwrap();
    Fixture {
        frozen,
        codec,
        driver,
        author,
        post,
        comment,
        audit,
    }
}

#[tokio::test]
async fn updates_fan_out_one_deduplicated_job_per_collection() {
    // A dedicated catalog where posts reference the author twice.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Draft {
        id: Uuid,
        author: AuthorSummary,
        editor: AuthorSummary,
    }

    impl Model for Draft {
        fn collection_name() -> &'static str {
            "drafts"
        }

        fn id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    let catalog = SchemaCatalog::new(DocumentVersion::new(1, 0, 0));
    catalog
        .add_schema::<Author>("author-v1", author_shape())
        .register()
        .unwrap();
    catalog
        .add_schema::<Draft>(
            "draft-v1",
            Shape::builder()
                .identifier("id")
                .reference::<Author>("author")
                .reference::<Author>("editor")
                .build(),
        )
        .register()
        .unwrap();
    catalog
        .add_schema::<Audit>(
            "audit-v1",
            Shape::builder()
                .identifier("id")
                .reference::<Author>("actor")
                .build(),
        )
        .register()
        .unwrap();
    let frozen = catalog.freeze().unwrap();

    let runner = RecordingTaskRunner::new();
    let maintainer = ConsistencyMaintainer::new(frozen, Arc::new(runner.clone()));
    let author = Author {
        id: Uuid::new(),
        name: "Ada".to_string(),
    };

    let jobs = maintainer.on_updated(&author).await.unwrap();
    assert_eq!(jobs, 2);

    let recorded = runner.fix_up_jobs().await;
    assert_eq!(recorded.len(), 2);
    let drafts = recorded
        .iter()
        .find(|j| j.collection == "drafts")
        .unwrap();
    assert_eq!(drafts.model_id, author.id);
    assert_eq!(drafts.id_paths, vec!["author.id", "editor.id"]);
    let audits = recorded
        .iter()
        .find(|j| j.collection == "audits")
        .unwrap();
    assert_eq!(audits.id_paths, vec!["actor.id"]);
}

#[tokio::test]
async fn changes_outside_the_declared_shapes_enqueue_nothing() {
    let catalog = SchemaCatalog::new(DocumentVersion::new(2, 0, 0));
    catalog
        .add_schema::<Author>("author-v2", author_shape())
        // The legacy schema also carried a nickname.
        .secondary_schema(
            "author-v1",
            Shape::builder()
                .identifier("id")
                .scalar("name")
                .scalar("nickname")
                .build(),
        )
        .register()
        .unwrap();
    catalog
        .add_schema::<Audit>(
            "audit-v1",
            Shape::builder()
                .identifier("id")
                .reference::<Author>("actor")
                .build(),
        )
        .register()
        .unwrap();
    let frozen = catalog.freeze().unwrap();
    let runner = RecordingTaskRunner::new();
    let maintainer = ConsistencyMaintainer::new(frozen, Arc::new(runner.clone()));
    let id = Uuid::new();

    // Neither an undeclared field nor the identifier makes summaries stale.
    let skipped = maintainer
        .on_updated_fields(TypeKey::of::<Author>(), id, &["last_login", "id"])
        .await
        .unwrap();
    assert_eq!(skipped, 0);
    assert!(runner.fix_up_jobs().await.is_empty());

    let jobs = maintainer
        .on_updated_fields(TypeKey::of::<Author>(), id, &["name"])
        .await
        .unwrap();
    assert_eq!(jobs, 1);

    // Declared only in the legacy schema, but summaries written under it
    // still hold the field.
    let legacy = maintainer
        .on_updated_fields(TypeKey::of::<Author>(), id, &["nickname"])
        .await
        .unwrap();
    assert_eq!(legacy, 1);
}

#[tokio::test]
async fn fan_out_reaches_transitively_embedded_summaries() {
    let frozen = cascade_catalog();
    let runner = RecordingTaskRunner::new();
    let maintainer = ConsistencyMaintainer::new(frozen, Arc::new(runner.clone()));

    let jobs = maintainer
        .on_updated_model(TypeKey::of::<Author>(), Uuid::new())
        .await
        .unwrap();
    // Posts and audits embed the author directly; comments embed it inside
    // the post summary.
    assert_eq!(jobs, 3);
    let recorded = runner.fix_up_jobs().await;
    let comments = recorded
        .iter()
        .find(|j| j.collection == "comments")
        .unwrap();
    assert_eq!(comments.id_paths, vec!["post.author.id"]);
}

#[tokio::test]
async fn deleting_an_author_cascades_through_posts_to_comments() {
    let fx = seed(MemoryDriver::new()).await;

    let deleted = cascade_delete(
        &fx.frozen,
        &fx.driver,
        TypeKey::of::<Author>(),
        fx.author.id,
    )
    .await
    .unwrap();
    // author + post + comment; the audit reference does not cascade.
    assert_eq!(deleted, 3);
    assert_eq!(fx.driver.collection_len("authors").await, 0);
    assert_eq!(fx.driver.collection_len("posts").await, 0);
    assert_eq!(fx.driver.collection_len("comments").await, 0);
    assert_eq!(fx.driver.collection_len("audits").await, 1);

    let audit_doc = fx
        .driver
        .get_document("audits", fx.audit.id)
        .await
        .unwrap();
    let audit: Audit = fx.codec.decode_root_as(audit_doc).unwrap();
    assert_eq!(audit.actor.id, fx.author.id);
}

/// Delegates to a [`MemoryDriver`] but refuses deletes in one collection.
struct BrokenDeletes {
    inner: MemoryDriver,
    refuse: &'static str,
}

#[async_trait]
impl StoreDriver for BrokenDeletes {
    async fn insert_documents(
        &self,
        collection: &str,
        docs: Vec<(Uuid, Document)>,
    ) -> MappingResult<()> {
        self.inner.insert_documents(collection, docs).await
    }

    async fn replace_document(
        &self,
        collection: &str,
        id: Uuid,
        doc: Document,
    ) -> MappingResult<()> {
        self.inner.replace_document(collection, id, doc).await
    }

    async fn delete_documents(&self, collection: &str, ids: &[Uuid]) -> MappingResult<u64> {
        if collection == self.refuse {
            return Err(MappingError::Driver(format!(
                "deletes disabled on {collection}"
            )));
        }
        self.inner.delete_documents(collection, ids).await
    }

    async fn get_documents(&self, collection: &str, ids: &[Uuid]) -> MappingResult<Vec<Document>> {
        self.inner.get_documents(collection, ids).await
    }

    async fn find_by_path(
        &self,
        collection: &str,
        path: &str,
        value: Bson,
    ) -> MappingResult<Vec<Document>> {
        self.inner.find_by_path(collection, path, value).await
    }

    async fn list_indexes(&self, collection: &str) -> MappingResult<Vec<String>> {
        self.inner.list_indexes(collection).await
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> MappingResult<()> {
        self.inner.create_index(collection, spec).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> MappingResult<()> {
        self.inner.drop_index(collection, name).await
    }
}

#[tokio::test]
async fn a_broken_branch_does_not_wedge_the_cascade() {
    let fx = seed(MemoryDriver::new()).await;
    let driver = BrokenDeletes {
        inner: fx.driver.clone(),
        refuse: "comments",
    };

    let deleted = cascade_delete(&fx.frozen, &driver, TypeKey::of::<Author>(), fx.author.id)
        .await
        .unwrap();
    // The comment branch failed and was skipped; the rest still went.
    assert_eq!(deleted, 2);
    assert_eq!(fx.driver.collection_len("authors").await, 0);
    assert_eq!(fx.driver.collection_len("posts").await, 0);
    assert_eq!(fx.driver.collection_len("comments").await, 1);

    // A failure to delete the requested root itself still propagates.
    let root_broken = BrokenDeletes {
        inner: fx.driver.clone(),
        refuse: "comments",
    };
    let err = cascade_delete(
        &fx.frozen,
        &root_broken,
        TypeKey::of::<Comment>(),
        fx.comment.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MappingError::Driver(_)));
    let _ = fx.post;
}

#[tokio::test]
async fn planned_indexes_are_created_once() {
    let fx = seed(MemoryDriver::new()).await;

    let created = ensure_indexes(&fx.frozen, &fx.driver, TypeKey::of::<Post>())
        .await
        .unwrap();
    // ver + ref_author.id.
    assert_eq!(created, 2);
    let mut names = fx.driver.list_indexes("posts").await.unwrap();
    names.sort();
    assert_eq!(names, vec!["ref_author.id".to_string(), "ver".to_string()]);

    // Idempotent: nothing new on the second pass.
    let created = ensure_indexes(&fx.frozen, &fx.driver, TypeKey::of::<Post>())
        .await
        .unwrap();
    assert_eq!(created, 0);

    // Comments embed the post summary, which nests the author reference.
    let created = ensure_indexes(&fx.frozen, &fx.driver, TypeKey::of::<Comment>())
        .await
        .unwrap();
    assert_eq!(created, 3);
    let names = fx.driver.list_indexes("comments").await.unwrap();
    assert!(names.contains(&"ref_post.id".to_string()));
    assert!(names.contains(&"ref_post.author.id".to_string()));
}
