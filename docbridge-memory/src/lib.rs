//! In-memory document store backend for docbridge.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It evaluates filters, sorts, projections, update
//! operators and a small aggregation pipeline in process, which makes it a
//! stand-in for a real server in development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Query support** - The filter language of [`docbridge_core::query`], with dotted paths
//! - **Bulk writes** - Ordered and unordered, with `_id` uniqueness and upserts
//! - **Commands** - `aggregate` (`$match`, `$sort`, `$skip`, `$limit`, `$project`, `$count`) and `listCollections`
//! - **Server codes** - Failures carry the codes a server reports (`11000`, `59`, ..)
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{batch::BatchKind, legacy::{LegacyArray, LegacyValue}, store::BridgeStore};
//! use docbridge_memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = BridgeStore::new(InMemoryStore::new());
//!     let users = store.collection("app", "users");
//!
//!     let mut batch = users.batch(BatchKind::Insert);
//!     batch.add(&LegacyValue::Array(LegacyArray::new().with("name", "ada")))?;
//!     batch.execute(&Default::default()).await?;
//!
//!     assert_eq!(users.count(LegacyValue::Null).await?, 1);
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbridge_memory;

pub mod evaluator;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
