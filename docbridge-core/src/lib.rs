//! Core of a bridge between a legacy, loosely typed document data model and a
//! strict BSON document store.
//!
//! This crate provides:
//!
//! - **Legacy values** ([`legacy`]) - Dynamic containers and the legacy scalar wrapper types
//! - **Type bridge** ([`convert`]) - Conversions between legacy values and BSON
//! - **Parameter normalization** ([`params`]) - Read preferences and write concerns
//! - **Cursors** ([`cursor`]) - Lazy query and command cursors with a build phase and an open phase
//! - **Write batches** ([`batch`]) - Validated, homogeneous bulk writes
//! - **Error taxonomy** ([`taxonomy`]) - Classification of store failures into legacy categories
//! - **Store backend abstraction** ([`backend`]) - The driver seam backends implement
//! - **Filters** ([`query`]) - A filter AST and its parser, for backends that evaluate filters themselves
//! - **Entry points** ([`store`], [`collection`]) - Factories seeded with [`config`] defaults
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docbridge::legacy::{LegacyArray, LegacyValue};
//! use docbridge::store::BridgeStore;
//!
//! let store = BridgeStore::new(backend);
//! let mut cursor = store.collection("app", "users").find(
//!     LegacyValue::Array(LegacyArray::new().with("age", LegacyArray::new().with("$gt", 21))),
//!     LegacyValue::Null,
//! );
//! cursor.sort(&LegacyValue::Array(LegacyArray::new().with("age", -1)))?;
//!
//! while cursor.valid().await? {
//!     println!("{:?}", cursor.current().await?);
//!     cursor.next().await?;
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbridge_core;

pub mod backend;
pub mod batch;
pub mod collection;
pub mod config;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod legacy;
pub mod options;
pub mod params;
pub mod query;
pub mod store;
pub mod taxonomy;

#[cfg(test)]
mod testing;
