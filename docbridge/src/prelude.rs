//! Convenient re-exports of commonly used types from docbridge.
//!
//! ```ignore
//! use docbridge::prelude::*;
//! ```
//!
//! This provides access to:
//! - The store entry points and cursors
//! - Legacy values and the conversions across the bridge
//! - Write batches and their results
//! - Read preference and write concern parameters
//! - Error types and the legacy error taxonomy

pub use docbridge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    batch::{BatchItem, BatchKind, BatchResult, WriteBatch, WriteOptions},
    collection::Collection,
    config::BridgeConfig,
    convert::{Framing, deserialize_legacy, document_from_legacy, from_legacy, legacy_from_serialize, to_legacy},
    cursor::{CommandCursor, Cursor, CursorInfo},
    error::{BridgeError, BridgeResult},
    legacy::{LegacyArray, LegacyObject, LegacyValue},
    options::Namespace,
    params::{Acknowledgment, ReadPreference, ReadPreferenceMode, WriteConcern},
    store::BridgeStore,
    taxonomy::{ErrorCategory, LegacyError},
};
