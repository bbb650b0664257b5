//! In-memory store driver for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreDriver` trait plus a recording `TaskRunner`. It uses async-aware
//! read-write locks for concurrent access and is ideal for development and
//! testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Path queries** - Dotted-path lookups with multikey arrays and `$**` map wildcards
//! - **Index bookkeeping** - Tracks planned index specs by deterministic name
//! - **Recorded background work** - Assert on enqueued fix-up and migration jobs
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel_memory::MemoryDriver;
//! use docmodel_core::driver::StoreDriver;
//! use bson::{Uuid, doc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MemoryDriver::new();
//!
//!     let id = Uuid::new();
//!     driver
//!         .insert_documents("users", vec![(id, doc! { "name": "Alice" })])
//!         .await?;
//!
//!     let docs = driver.get_documents("users", &[id]).await?;
//!     assert_eq!(docs.len(), 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod driver;

pub use driver::{MemoryDriver, RecordingTaskRunner};
