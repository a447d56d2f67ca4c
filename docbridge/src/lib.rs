//! Main docbridge crate: a bridge between the legacy dynamic-container
//! document model and a strict BSON document store.
//!
//! This crate is the primary entry point. It re-exports the core modules and
//! gives access to the available store backends.
//!
//! # Features
//!
//! - **Type bridge** - Loss-aware conversions between legacy values and BSON
//! - **Lazy cursors** - Build a query, then iterate it; mutation after open is an error
//! - **Command cursors** - Iterate `aggregate` and other cursor-returning commands
//! - **Write batches** - Validated, homogeneous bulk writes with partial-failure results
//! - **Error taxonomy** - Store failures classified into legacy error categories
//!
//! # Quick Start
//!
//! ```ignore
//! use docbridge::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BridgeError> {
//!     let store = BridgeStore::new(InMemoryStore::new());
//!     let users = store.collection("app", "users");
//!
//!     // Insert through a batch
//!     let mut batch = users.batch(BatchKind::Insert);
//!     batch.add(&LegacyValue::Array(LegacyArray::new().with("name", "ada").with("age", 36)))?;
//!     let result = batch.execute(&WriteOptions::default()).await?;
//!     assert!(result.ok);
//!
//!     // Query through a cursor
//!     let mut cursor = users.find(
//!         LegacyValue::Array(LegacyArray::new().with("age", LegacyArray::new().with("$gt", 30))),
//!         LegacyValue::list(["name".into()]),
//!     );
//!     cursor.sort(&LegacyValue::Array(LegacyArray::new().with("age", -1)))?;
//!
//!     while let Some(user) = cursor.get_next().await? {
//!         println!("{user:?}");
//!     }
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Errors
//!
//! Failures reported by a backend never surface raw. They are classified into
//! a [`taxonomy::ErrorCategory`] and arrive as [`error::BridgeError::Legacy`]:
//!
//! ```ignore
//! match batch.execute(&WriteOptions::default()).await {
//!     Err(BridgeError::Legacy(e)) if e.category == ErrorCategory::Connection => retry(),
//!     other => other?,
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docbridge_core::{
    backend, batch, collection, config, convert, cursor, error, legacy, options, params, query,
    store, taxonomy,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbridge_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbridge_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
