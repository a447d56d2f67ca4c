//! Collection handles that create cursors and write batches.
//!
//! A [`Collection`] is a thin factory bound to one namespace. Every cursor or
//! batch it creates starts from the store's [`BridgeConfig`] defaults.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::batch::BatchKind;
//! use docbridge::legacy::{LegacyArray, LegacyValue};
//!
//! let users = store.collection("app", "users");
//!
//! let mut cursor = users.find(
//!     LegacyValue::Array(LegacyArray::new().with("active", true)),
//!     LegacyValue::list(["name".into()]),
//! );
//! let names = cursor.to_vec().await?;
//!
//! let mut batch = users.batch(BatchKind::Delete);
//! batch.add(&delete_descriptor)?;
//! batch.execute(&Default::default()).await?;
//! ```

use serde::de::DeserializeOwned;

use crate::{
    backend::StoreBackend,
    batch::{BatchKind, WriteBatch},
    config::BridgeConfig,
    convert::{Framing, deserialize_legacy},
    cursor::{CommandCursor, Cursor},
    error::BridgeResult,
    legacy::{LegacyArray, LegacyObject, LegacyValue},
    options::Namespace,
};

/// A collection with a reference to a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend and configuration references
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    namespace: Namespace,
    backend: &'a B,
    config: &'a BridgeConfig,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(namespace: Namespace, backend: &'a B, config: &'a BridgeConfig) -> Self {
        Self {
            namespace,
            backend,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.namespace.collection
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Creates a building cursor for a legacy filter and field selection.
    ///
    /// Nothing is sent to the store until the cursor is iterated.
    pub fn find(&self, query: LegacyValue, fields: LegacyValue) -> Cursor<'a, B> {
        Cursor::new(self.backend, self.namespace.clone(), query, fields).with_defaults(self.config)
    }

    /// Returns the first matching document, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter cannot be converted or the query fails.
    pub async fn find_one(&self, query: LegacyValue, fields: LegacyValue) -> BridgeResult<Option<LegacyValue>> {
        let mut cursor = self.find(query, fields);
        cursor.limit(-1)?;
        cursor.current().await
    }

    /// Returns the first matching document deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`](crate::error::BridgeError::Serialization)
    /// if the document does not fit `T`.
    pub async fn find_one_as<T: DeserializeOwned>(&self, query: LegacyValue) -> BridgeResult<Option<T>> {
        // empty sub-documents must stay maps
        let mut cursor = self.find(query, LegacyValue::Null);
        cursor.limit(-1)?.framing(Framing::Objects);
        match cursor.current().await? {
            Some(document) => Ok(Some(deserialize_legacy(&document)?)),
            None => Ok(None),
        }
    }

    /// Counts the documents matching a legacy filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter cannot be converted or the count fails.
    pub async fn count(&self, query: LegacyValue) -> BridgeResult<u64> {
        self.find(query, LegacyValue::Null).count(false).await
    }

    /// Creates an empty write batch seeded with the configured write concern
    /// and ordering.
    pub fn batch(&self, kind: BatchKind) -> WriteBatch<'a, B> {
        WriteBatch::new(self.backend, self.namespace.clone(), kind)
            .with_write_concern(self.config.write_concern.clone())
            .with_ordered(self.config.ordered)
    }

    /// Creates a command cursor over an `aggregate` command on this collection.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - The legacy list of pipeline stages
    pub fn aggregate_cursor(&self, pipeline: LegacyValue) -> CommandCursor<'a, B> {
        let command = LegacyArray::new()
            .with("aggregate", self.namespace.collection.as_str())
            .with("pipeline", pipeline)
            .with("cursor", LegacyObject::new());

        CommandCursor::new(self.backend, self.namespace.clone(), LegacyValue::Array(command))
            .with_defaults(self.config)
    }
}
