//! Document store driver abstraction.
//!
//! The bridge never talks to a database directly. It consumes a
//! [`StoreBackend`], which executes finished requests (queries, commands,
//! counts and bulk writes), and the [`IterationHandle`]s a backend hands back
//! for result sets.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The driver a bridge store executes requests against
//! - [`IterationHandle`]: A live, single-owner result cursor
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docbridge::backend::StoreBackend;
//! use docbridge::options::{FindOptions, Namespace};
//! use bson::doc;
//!
//! let mut handle = backend
//!     .execute_query(&Namespace::new("app", "users"), doc! { "age": { "$gt": 21 } }, FindOptions::default())
//!     .await?;
//!
//! while handle.advance().await? {
//!     println!("{:?}", handle.current());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    error::DriverError,
    options::{BulkWriteOptions, CommandOptions, CountOptions, FindOptions, Namespace},
};

/// A specialized `Result` type for backend operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// The role of the server a cursor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Standalone,
    Primary,
    Secondary,
    Arbiter,
    Mongos,
    Unknown,
}

impl ServerRole {
    /// The legacy connection type label for this role.
    pub fn connection_type_desc(&self) -> &'static str {
        match self {
            ServerRole::Arbiter => "ARBITER",
            ServerRole::Mongos => "MONGOS",
            ServerRole::Primary => "PRIMARY",
            ServerRole::Secondary => "SECONDARY",
            ServerRole::Standalone | ServerRole::Unknown => "STANDALONE",
        }
    }
}

/// Address and role of the server a cursor is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub role: ServerRole,
}

impl ServerInfo {
    /// `host:port`, as legacy cursor info reports it.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A live result set.
///
/// Handles start positioned *before* the first document; the first
/// [`advance`](Self::advance) moves onto it.
#[async_trait]
pub trait IterationHandle: Send + Sync + Debug {
    /// Moves to the next document. Returns `false` once the results are exhausted.
    async fn advance(&mut self) -> DriverResult<bool>;

    /// The document the handle is positioned on, if any.
    fn current(&self) -> Option<&Document>;

    /// Whether the server side cursor is gone; a dead handle yields nothing more.
    fn is_dead(&self) -> bool;

    /// The server the cursor lives on, once known.
    fn server_info(&self) -> Option<ServerInfo>;

    /// The server side cursor id, `0` once the cursor is exhausted.
    fn cursor_id(&self) -> i64;
}

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

/// A document created by an upserting write.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertedId {
    /// Position of the upserting operation in the submitted list.
    pub index: usize,
    pub id: Bson,
}

/// Aggregated counters of a bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub deleted_count: u64,
    pub upserted: Vec<UpsertedId>,
}

/// The document store driver the bridge executes requests against.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the handles they return are owned by
/// exactly one cursor.
///
/// # Error Handling
///
/// Backends report [`DriverError`]s. Callers of the bridge never see these
/// directly: cursors and batches classify them with
/// [`map_error`](crate::taxonomy::map_error) first.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Executes a find request and returns a handle over its results.
    ///
    /// # Arguments
    ///
    /// * `namespace` - The collection to query
    /// * `filter` - The query filter document
    /// * `options` - Projection, sort, paging and cursor flags
    async fn execute_query(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn IterationHandle>>;

    /// Runs a cursor-returning command (`aggregate`, `listCollections`, ..) against a database.
    ///
    /// # Arguments
    ///
    /// * `database` - The database to run the command in
    /// * `command` - The command document; its first key names the command
    /// * `options` - Batch size, max time and read preference
    async fn execute_command(
        &self,
        database: &str,
        command: Document,
        options: CommandOptions,
    ) -> DriverResult<Box<dyn IterationHandle>>;

    /// Executes a list of write operations as one bulk write.
    ///
    /// # Errors
    ///
    /// When some items fail, returns a [`DriverErrorKind::BulkWrite`](crate::error::DriverErrorKind::BulkWrite)
    /// error carrying the counters of the items that succeeded.
    async fn execute_bulk_write(
        &self,
        namespace: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult>;

    /// Counts documents matching `filter`.
    async fn count(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: CountOptions,
    ) -> DriverResult<u64>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DriverResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn execute_query(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        (*self)
            .execute_query(namespace, filter, options)
            .await
    }

    async fn execute_command(
        &self,
        database: &str,
        command: Document,
        options: CommandOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        (*self)
            .execute_command(database, command, options)
            .await
    }

    async fn execute_bulk_write(
        &self,
        namespace: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult> {
        (*self)
            .execute_bulk_write(namespace, models, options)
            .await
    }

    async fn count(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: CountOptions,
    ) -> DriverResult<u64> {
        (*self)
            .count(namespace, filter, options)
            .await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DriverResult<Self::Backend>;
}
