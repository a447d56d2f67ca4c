//! MongoDB backend implementation for docbridge.
//!
//! This crate provides a `StoreBackend` over the official MongoDB driver, so
//! bridge cursors and write batches run against a real server.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docbridge = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Mapping
//!
//! - Find requests become driver `find` calls, with legacy query modifiers
//!   (`$comment`, `$min`, `$max`, ..) mapped onto find options
//! - Cursor commands run through `run_cursor_command`
//! - Bulk writes run item by item, collecting per-item write errors
//! - Driver errors are reclassified into `DriverError` kinds, keeping server codes
//!
//! # Example
//!
//! ```ignore
//! use docbridge::{backend::StoreBackendBuilder, mongodb::MongoDbStore, store::BridgeStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017")
//!         .build()
//!         .await?;
//!     let store = BridgeStore::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbridge_mongodb;

mod mapping;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
