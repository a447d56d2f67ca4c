use async_trait::async_trait;
use bson::Document;
use mongodb::{
    Client, Collection as MongoCollection, Cursor as MongoCursor,
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, ServerAddress},
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use tracing::debug;

use docbridge_core::{
    backend::{
        BulkWriteResult, DriverResult, IterationHandle, ServerInfo, ServerRole, StoreBackend,
        StoreBackendBuilder, UpsertedId, WriteModel,
    },
    error::{BulkWriteFailure, DriverError, DriverErrorKind, WriteConcernError, WriteError},
    options::{BulkWriteOptions, CommandOptions, CountOptions, FindOptions, Namespace},
};

use crate::mapping::{command_options, count_options, driver_error, find_options, write_concern};

const DEFAULT_PORT: u16 = 27017;

/// A [`StoreBackend`] over the official MongoDB driver.
///
/// Every operation runs against the database and collection named by its
/// namespace; the store itself is not bound to a database.
///
/// A write batch is not one round trip: its items are sent one at a time, in
/// order, through the collection's single-document write commands.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    server: Option<ServerInfo>,
    cursor_ids: Arc<AtomicI64>,
}

impl MongoDbStore {
    pub fn new(client: Client, server: Option<ServerInfo>) -> Self {
        Self {
            client,
            server,
            cursor_ids: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn builder(dsn: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn)
    }

    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(&namespace.database)
            .collection(&namespace.collection)
    }

    fn handle(&self, cursor: MongoCursor<Document>) -> MongoHandle {
        MongoHandle {
            cursor: Mutex::new(cursor),
            current: None,
            exhausted: false,
            id: self.cursor_ids.fetch_add(1, Ordering::Relaxed),
            server: self.server.clone(),
        }
    }

    async fn write_one(
        &self,
        collection: &MongoCollection<Document>,
        index: usize,
        model: WriteModel,
        options: &BulkWriteOptions,
        result: &mut BulkWriteResult,
    ) -> mongodb::error::Result<()> {
        let concern = options.write_concern.as_ref().map(write_concern);

        macro_rules! with_concern {
            ($action:expr) => {
                match concern {
                    Some(concern) => $action.write_concern(concern).await?,
                    None => $action.await?,
                }
            };
        }

        match model {
            WriteModel::InsertOne { document } => {
                with_concern!(collection.insert_one(document));
                result.inserted_count += 1;
            }
            WriteModel::UpdateOne { filter, update, upsert } => {
                let updated = with_concern!(collection.update_one(filter, update).upsert(upsert));
                self.record_update(index, updated, result);
            }
            WriteModel::UpdateMany { filter, update, upsert } => {
                let updated = with_concern!(collection.update_many(filter, update).upsert(upsert));
                self.record_update(index, updated, result);
            }
            WriteModel::ReplaceOne { filter, replacement, upsert } => {
                let updated = with_concern!(collection.replace_one(filter, replacement).upsert(upsert));
                self.record_update(index, updated, result);
            }
            WriteModel::DeleteOne { filter } => {
                result.deleted_count += with_concern!(collection.delete_one(filter)).deleted_count;
            }
            WriteModel::DeleteMany { filter } => {
                result.deleted_count += with_concern!(collection.delete_many(filter)).deleted_count;
            }
        }

        Ok(())
    }

    fn record_update(&self, index: usize, updated: mongodb::results::UpdateResult, result: &mut BulkWriteResult) {
        result.matched_count += updated.matched_count;
        result.modified_count += updated.modified_count;
        if let Some(id) = updated.upserted_id {
            result.upserted_count += 1;
            result.upserted.push(UpsertedId { index, id });
        }
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn execute_query(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        debug!(%namespace, "executing find");

        let cursor = self
            .get_collection(namespace)
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(driver_error)?;

        Ok(Box::new(self.handle(cursor)))
    }

    async fn execute_command(
        &self,
        database: &str,
        command: Document,
        options: CommandOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        let cursor = self
            .client
            .database(database)
            .run_cursor_command(command)
            .with_options(command_options(options))
            .await
            .map_err(driver_error)?;

        Ok(Box::new(self.handle(cursor)))
    }

    async fn execute_bulk_write(
        &self,
        namespace: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult> {
        let collection = self.get_collection(namespace);
        let mut result = BulkWriteResult::default();
        let mut write_errors = Vec::new();
        let mut write_concern_error = None;

        for (index, model) in models.into_iter().enumerate() {
            let Err(error) = self.write_one(&collection, index, model, &options, &mut result).await else {
                continue;
            };

            match error.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(write)) => {
                    write_errors.push(WriteError {
                        index,
                        code: write.code,
                        message: write.message.clone(),
                    });
                    if options.ordered {
                        break;
                    }
                }
                ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
                    write_concern_error = Some(WriteConcernError {
                        code: concern.code,
                        message: concern.message.clone(),
                    });
                }
                _ => return Err(driver_error(error)),
            }
        }

        debug!(
            %namespace,
            failed = write_errors.len(),
            ordered = options.ordered,
            "executed bulk write"
        );

        if write_errors.is_empty() && write_concern_error.is_none() {
            return Ok(result);
        }

        Err(DriverError::bulk_write(BulkWriteFailure {
            partial: result,
            write_errors,
            write_concern_error,
        }))
    }

    async fn count(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: CountOptions,
    ) -> DriverResult<u64> {
        self.get_collection(namespace)
            .count_documents(filter)
            .with_options(count_options(options))
            .await
            .map_err(driver_error)
    }

    async fn shutdown(self) -> DriverResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// A live driver cursor.
///
/// The driver cursor is `Send` but not `Sync`; the mutex is only ever
/// borrowed mutably, never locked.
#[derive(Debug)]
struct MongoHandle {
    cursor: Mutex<MongoCursor<Document>>,
    current: Option<Document>,
    exhausted: bool,
    id: i64,
    server: Option<ServerInfo>,
}

#[async_trait]
impl IterationHandle for MongoHandle {
    async fn advance(&mut self) -> DriverResult<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let cursor = self
            .cursor
            .get_mut()
            .map_err(|_| DriverError::other("cursor poisoned by an earlier panic"))?;

        if cursor.advance().await.map_err(driver_error)? {
            self.current = Some(cursor.deserialize_current().map_err(driver_error)?);
            Ok(true)
        } else {
            self.current = None;
            self.exhausted = true;
            Ok(false)
        }
    }

    fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    fn is_dead(&self) -> bool {
        self.exhausted
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server.clone()
    }

    fn cursor_id(&self) -> i64 {
        if self.exhausted { 0 } else { self.id }
    }
}

/// Builder for [`MongoDbStore`] from a connection string.
///
/// # Example
///
/// ```ignore
/// use docbridge::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
///
/// let backend = MongoDbStore::builder("mongodb://localhost:27017")
///     .app_name("billing")
///     .build()
///     .await?;
/// ```
pub struct MongoDbStoreBuilder {
    dsn: String,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            app_name: None,
        }
    }

    /// Sets the application name reported to the server.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

/// The seed address cursors report; the driver does not expose the server a
/// cursor was opened on.
fn seed_server(address: Option<&ServerAddress>, direct: bool) -> Option<ServerInfo> {
    match address? {
        ServerAddress::Tcp { host, port } => Some(ServerInfo {
            host: host.clone(),
            port: port.unwrap_or(DEFAULT_PORT),
            role: if direct { ServerRole::Standalone } else { ServerRole::Unknown },
        }),
        _ => None,
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DriverResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::Connection, e.to_string()))?;
        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }

        let server = seed_server(options.hosts.first(), options.direct_connection == Some(true));
        let client = Client::with_options(options)
            .map_err(|e| DriverError::new(DriverErrorKind::Connection, e.to_string()))?;

        Ok(MongoDbStore::new(client, server))
    }
}
