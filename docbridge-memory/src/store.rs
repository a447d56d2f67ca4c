//! In-memory storage implementation of the store backend.
//!
//! Documents are kept per namespace, in insertion order, behind an
//! async-aware read-write lock. Filters, sorts, projections and update
//! operators are evaluated in process, and failures carry the same numeric
//! codes a server would report so they classify the same way.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tracing::debug;

use docbridge_core::{
    backend::{
        BulkWriteResult, DriverResult, IterationHandle, ServerInfo, ServerRole, StoreBackend,
        StoreBackendBuilder, UpsertedId, WriteModel,
    },
    error::{BulkWriteFailure, DriverError, WriteConcernError, WriteError},
    options::{BulkWriteOptions, CommandOptions, CountOptions, FindOptions, Namespace},
    params::{Acknowledgment, WriteConcern},
    query::{Expr, QueryParseError, Sort},
};

use crate::{
    evaluator::{DocumentEvaluator, PatternCache, compare_documents},
    update::{apply_operators, is_operator_update, project, replace, upsert_seed},
};

/// namespace (`database.collection`) -> documents in insertion order
type StoreMap = HashMap<String, Vec<Document>>;

const BAD_VALUE: i32 = 2;
const UNKNOWN_ERROR: i32 = 8;
const FAILED_TO_PARSE: i32 = 9;
const COMMAND_NOT_FOUND: i32 = 59;
const UNKNOWN_REPL_WRITE_CONCERN: i32 = 79;
const UNSATISFIABLE_WRITE_CONCERN: i32 = 100;
const DUPLICATE_KEY: i32 = 11000;
const INVALID_STAGE: i32 = 40323;
const UNRECOGNIZED_STAGE: i32 = 40324;

fn bad_value(err: QueryParseError) -> DriverError {
    DriverError::command(BAD_VALUE, err.0)
}

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same documents.
///
/// # Performance
///
/// Every query scans its whole collection; there are no indexes apart from the
/// uniqueness check on `_id`.
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::store::BridgeStore;
///
/// let store = BridgeStore::new(InMemoryStore::new());
/// let users = store.collection("app", "users");
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
    server: ServerInfo,
    cursor_ids: Arc<AtomicI64>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store reporting a standalone server on `localhost:27017`.
    pub fn new() -> Self {
        InMemoryStoreBuilder::default().into_store()
    }

    /// Creates a builder for constructing an `InMemoryStore` with a custom
    /// server identity.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docbridge_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().port(27018).build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns a snapshot of the documents stored in `namespace`.
    pub async fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(&namespace.to_string())
            .cloned()
            .unwrap_or_default()
    }

    fn handle(&self, documents: Vec<Document>) -> MemoryHandle {
        MemoryHandle {
            pending: documents.into(),
            current: None,
            id: self.cursor_ids.fetch_add(1, Ordering::Relaxed),
            server: self.server.clone(),
        }
    }

    async fn aggregate(&self, database: &str, command: &Document) -> DriverResult<Vec<Document>> {
        let collection = command
            .get_str("aggregate")
            .map_err(|_| DriverError::command(BAD_VALUE, "aggregate requires a collection name"))?;
        let pipeline = command
            .get_array("pipeline")
            .map_err(|_| DriverError::command(BAD_VALUE, "aggregate requires a pipeline array"))?;
        if !command.contains_key("cursor") {
            return Err(DriverError::command(
                FAILED_TO_PARSE,
                "The 'cursor' option is required, except for aggregate with the explain argument",
            ));
        }

        let namespace = Namespace::new(database, collection);
        let mut documents = self.documents(&namespace).await;

        for stage in pipeline {
            let stage = match stage {
                Bson::Document(stage) if stage.len() == 1 => stage,
                _ => {
                    return Err(DriverError::command(
                        INVALID_STAGE,
                        "A pipeline stage specification object must contain exactly one field.",
                    ));
                }
            };

            for (name, spec) in stage {
                documents = run_stage(documents, name, spec)?;
            }
        }

        debug!(%namespace, returned = documents.len(), "ran in-memory aggregation");
        Ok(documents)
    }

    async fn list_collections(&self, database: &str, command: &Document) -> DriverResult<Vec<Document>> {
        let prefix = format!("{database}.");
        let mut names: Vec<String> = self
            .store
            .read()
            .await
            .keys()
            .filter_map(|ns| ns.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();

        let entries: Vec<Document> = names
            .into_iter()
            .map(|name| {
                let mut entry = Document::new();
                entry.insert("name", name);
                entry.insert("type", "collection");
                entry
            })
            .collect();

        match command.get("filter") {
            Some(Bson::Document(filter)) => select(&entries, filter, None),
            _ => Ok(entries),
        }
    }
}

fn select(documents: &[Document], filter: &Document, sort: Option<&Document>) -> DriverResult<Vec<Document>> {
    let expr = Expr::from_filter(filter).map_err(bad_value)?;
    let mut matched = DocumentEvaluator::filter_documents(documents, expr.as_ref()).map_err(bad_value)?;

    if let Some(sort) = sort {
        let sorts = Sort::from_document(sort).map_err(bad_value)?;
        matched.sort_by(|a, b| compare_documents(a, b, &sorts));
    }

    Ok(matched)
}

/// Positions of the documents matching `filter`.
fn positions(documents: &[Document], filter: &Document) -> DriverResult<Vec<usize>> {
    let Some(expr) = Expr::from_filter(filter).map_err(bad_value)? else {
        return Ok((0..documents.len()).collect());
    };

    let mut patterns = PatternCache::default();
    let mut found = Vec::new();
    for (position, document) in documents.iter().enumerate() {
        if DocumentEvaluator::new(document, &mut patterns)
            .evaluate(&expr)
            .map_err(bad_value)?
        {
            found.push(position);
        }
    }

    Ok(found)
}

fn page(documents: Vec<Document>, skip: Option<u64>, limit: Option<u64>) -> Vec<Document> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = match limit {
        Some(0) | None => usize::MAX,
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    };

    documents.into_iter().skip(skip).take(take).collect()
}

fn stage_count(stage: &str, value: &Bson) -> DriverResult<u64> {
    let n = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        _ => -1,
    };

    u64::try_from(n)
        .map_err(|_| DriverError::command(BAD_VALUE, format!("invalid argument to {stage} stage: {value}")))
}

fn run_stage(documents: Vec<Document>, name: &str, spec: &Bson) -> DriverResult<Vec<Document>> {
    match (name, spec) {
        ("$match", Bson::Document(filter)) => select(&documents, filter, None),
        ("$sort", Bson::Document(sort)) => {
            let mut documents = documents;
            let sorts = Sort::from_document(sort).map_err(bad_value)?;
            documents.sort_by(|a, b| compare_documents(a, b, &sorts));
            Ok(documents)
        }
        ("$skip", n) => Ok(page(documents, Some(stage_count(name, n)?), None)),
        ("$limit", n) => match stage_count(name, n)? {
            0 => Err(DriverError::command(BAD_VALUE, "the limit must be positive")),
            n => Ok(page(documents, None, Some(n))),
        },
        ("$project", Bson::Document(projection)) => documents
            .iter()
            .map(|document| project(document, projection))
            .collect(),
        ("$count", Bson::String(field)) => {
            let mut counted = Document::new();
            counted.insert(field.as_str(), i32::try_from(documents.len()).unwrap_or(i32::MAX));
            Ok(vec![counted])
        }
        ("$match" | "$sort" | "$project" | "$count", other) => Err(DriverError::command(
            BAD_VALUE,
            format!("invalid argument to {name} stage: {other}"),
        )),
        (other, _) => Err(DriverError::command(
            UNRECOGNIZED_STAGE,
            format!("Unrecognized pipeline stage name: '{other}'"),
        )),
    }
}

fn ensure_id(document: Document) -> (Document, Bson) {
    if let Some(id) = document.get("_id").cloned() {
        return (document, id);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut stored = Document::new();
    stored.insert("_id", id.clone());
    stored.extend(document);
    (stored, id)
}

fn check_unique(documents: &[Document], id: &Bson, namespace: &str) -> DriverResult<()> {
    if documents.iter().any(|existing| existing.get("_id") == Some(id)) {
        return Err(DriverError::command(
            DUPLICATE_KEY,
            format!("E11000 duplicate key error collection: {namespace} index: _id_ dup key: {{ _id: {id} }}"),
        ));
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum Change<'a> {
    Operators(&'a Document),
    Replacement(&'a Document),
}

/// A single collection being written to by one bulk write.
struct Writer<'a> {
    namespace: String,
    documents: &'a mut Vec<Document>,
    result: BulkWriteResult,
}

impl Writer<'_> {
    fn apply(&mut self, index: usize, model: WriteModel) -> DriverResult<()> {
        match model {
            WriteModel::InsertOne { document } => self.insert(document),
            WriteModel::UpdateOne { filter, update, upsert } => {
                self.update(index, &filter, Change::Operators(&update), false, upsert)
            }
            WriteModel::UpdateMany { filter, update, upsert } => {
                self.update(index, &filter, Change::Operators(&update), true, upsert)
            }
            WriteModel::ReplaceOne { filter, replacement, upsert } => {
                self.update(index, &filter, Change::Replacement(&replacement), false, upsert)
            }
            WriteModel::DeleteOne { filter } => self.delete(&filter, false),
            WriteModel::DeleteMany { filter } => self.delete(&filter, true),
        }
    }

    fn insert(&mut self, document: Document) -> DriverResult<()> {
        let (document, id) = ensure_id(document);
        check_unique(self.documents.as_slice(), &id, &self.namespace)?;
        self.documents.push(document);
        self.result.inserted_count += 1;
        Ok(())
    }

    fn update(&mut self, index: usize, filter: &Document, change: Change<'_>, multi: bool, upsert: bool) -> DriverResult<()> {
        if let Change::Operators(update) = change {
            if !is_operator_update(update) {
                return Err(DriverError::command(FAILED_TO_PARSE, "update document requires atomic operators"));
            }
        }

        let mut targets = positions(self.documents.as_slice(), filter)?;
        if !multi {
            targets.truncate(1);
        }

        if targets.is_empty() {
            return if upsert { self.upsert(index, filter, change) } else { Ok(()) };
        }

        let mut updated = Vec::with_capacity(targets.len());
        for position in targets {
            let current = &self.documents[position];
            let next = match change {
                Change::Operators(update) => {
                    let mut next = current.clone();
                    apply_operators(&mut next, update, false)?;
                    next
                }
                Change::Replacement(replacement) => replace(current, replacement)?,
            };
            updated.push((position, next));
        }

        self.result.matched_count += updated.len() as u64;
        for (position, next) in updated {
            if self.documents[position] != next {
                self.documents[position] = next;
                self.result.modified_count += 1;
            }
        }

        Ok(())
    }

    fn upsert(&mut self, index: usize, filter: &Document, change: Change<'_>) -> DriverResult<()> {
        let seed = upsert_seed(filter)?;
        let document = match change {
            Change::Operators(update) => {
                let mut document = seed;
                apply_operators(&mut document, update, true)?;
                document
            }
            Change::Replacement(replacement) => {
                let mut document = Document::new();
                if let Some(id) = replacement.get("_id").or_else(|| seed.get("_id")) {
                    document.insert("_id", id.clone());
                }
                for (key, value) in replacement {
                    if key != "_id" {
                        document.insert(key.clone(), value.clone());
                    }
                }
                document
            }
        };

        let (document, id) = ensure_id(document);
        check_unique(self.documents.as_slice(), &id, &self.namespace)?;
        self.documents.push(document);
        self.result.upserted_count += 1;
        self.result.upserted.push(UpsertedId { index, id });
        Ok(())
    }

    fn delete(&mut self, filter: &Document, multi: bool) -> DriverResult<()> {
        let mut targets = positions(self.documents.as_slice(), filter)?;
        if !multi {
            targets.truncate(1);
        }

        for position in targets.iter().rev() {
            self.documents.remove(*position);
        }
        self.result.deleted_count += targets.len() as u64;
        Ok(())
    }
}

/// A standalone server can only acknowledge `w: 0`, `w: 1` or `"majority"`.
fn write_concern_error(write_concern: &WriteConcern) -> Option<WriteConcernError> {
    match &write_concern.w {
        Acknowledgment::Nodes(n) if *n > 1 => Some(WriteConcernError {
            code: UNSATISFIABLE_WRITE_CONCERN,
            message: format!("Not enough data-bearing nodes to satisfy w: {n}"),
        }),
        Acknowledgment::Tag(tag) if tag != "majority" => Some(WriteConcernError {
            code: UNKNOWN_REPL_WRITE_CONCERN,
            message: format!("unrecognized getLastError mode: {tag}"),
        }),
        _ => None,
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn execute_query(
        &self,
        namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        let matched = {
            let store = self.store.read().await;
            let documents = store
                .get(&namespace.to_string())
                .map(Vec::as_slice)
                .unwrap_or_default();
            select(documents, &filter, options.sort.as_ref())?
        };

        let paged = page(matched, options.skip, options.limit.map(i64::unsigned_abs));
        let results = match &options.projection {
            Some(projection) => paged
                .iter()
                .map(|document| project(document, projection))
                .collect::<DriverResult<Vec<_>>>()?,
            None => paged,
        };

        debug!(%namespace, returned = results.len(), "executed in-memory query");
        Ok(Box::new(self.handle(results)))
    }

    async fn execute_command(
        &self,
        database: &str,
        command: Document,
        _options: CommandOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        let name = command
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| DriverError::command(BAD_VALUE, "empty command document"))?;

        let results = match name.as_str() {
            "aggregate" => self.aggregate(database, &command).await?,
            "listCollections" => self.list_collections(database, &command).await?,
            other => {
                return Err(DriverError::command(
                    COMMAND_NOT_FOUND,
                    format!("no such command: '{other}'"),
                ));
            }
        };

        Ok(Box::new(self.handle(results)))
    }

    async fn execute_bulk_write(
        &self,
        namespace: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult> {
        let mut store = self.store.write().await;
        let mut writer = Writer {
            namespace: namespace.to_string(),
            documents: store.entry(namespace.to_string()).or_default(),
            result: BulkWriteResult::default(),
        };

        let submitted = models.len();
        let mut write_errors = Vec::new();
        for (index, model) in models.into_iter().enumerate() {
            if let Err(error) = writer.apply(index, model) {
                write_errors.push(WriteError {
                    index,
                    code: error.code.unwrap_or(UNKNOWN_ERROR),
                    message: error.message,
                });
                if options.ordered {
                    break;
                }
            }
        }

        let write_concern_error = options.write_concern.as_ref().and_then(write_concern_error);
        debug!(
            %namespace,
            submitted,
            failed = write_errors.len(),
            ordered = options.ordered,
            "executed in-memory bulk write"
        );

        if write_errors.is_empty() && write_concern_error.is_none() {
            return Ok(writer.result);
        }

        Err(DriverError::bulk_write(BulkWriteFailure {
            partial: writer.result,
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
        let store = self.store.read().await;
        let documents = store
            .get(&namespace.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let matched = positions(documents, &filter)?.len() as u64;

        let remaining = matched.saturating_sub(options.skip.unwrap_or(0));
        Ok(match options.limit {
            Some(limit) if limit > 0 => remaining.min(limit),
            _ => remaining,
        })
    }
}

#[derive(Debug)]
struct MemoryHandle {
    pending: VecDeque<Document>,
    current: Option<Document>,
    id: i64,
    server: ServerInfo,
}

#[async_trait]
impl IterationHandle for MemoryHandle {
    async fn advance(&mut self) -> DriverResult<bool> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    fn is_dead(&self) -> bool {
        self.pending.is_empty()
    }

    fn server_info(&self) -> Option<ServerInfo> {
        Some(self.server.clone())
    }

    fn cursor_id(&self) -> i64 {
        if self.pending.is_empty() { 0 } else { self.id }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// The address and role only show up in cursor info; nothing listens on them.
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::backend::{ServerRole, StoreBackendBuilder};
///
/// let store = InMemoryStore::builder()
///     .host("db.internal")
///     .role(ServerRole::Primary)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStoreBuilder {
    host: String,
    port: u16,
    role: ServerRole,
}

impl Default for InMemoryStoreBuilder {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
            role: ServerRole::Standalone,
        }
    }
}

impl InMemoryStoreBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn role(mut self, role: ServerRole) -> Self {
        self.role = role;
        self
    }

    fn into_store(self) -> InMemoryStore {
        InMemoryStore {
            store: Arc::new(RwLock::new(StoreMap::new())),
            server: ServerInfo {
                host: self.host,
                port: self.port,
                role: self.role,
            },
            cursor_ids: Arc::new(AtomicI64::new(1)),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds a new, empty [`InMemoryStore`]. This always succeeds.
    async fn build(self) -> DriverResult<Self::Backend> {
        Ok(self.into_store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docbridge_core::error::DriverErrorKind;

    fn users() -> Namespace {
        Namespace::new("app", "users")
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let models = [
            doc! { "_id": 1, "name": "ada", "age": 36, "team": "core" },
            doc! { "_id": 2, "name": "grace", "age": 45, "team": "core" },
            doc! { "_id": 3, "name": "linus", "age": 30, "team": "kernel" },
        ]
        .into_iter()
        .map(|document| WriteModel::InsertOne { document })
        .collect();

        store
            .execute_bulk_write(&users(), models, BulkWriteOptions::default())
            .await
            .unwrap();
        store
    }

    async fn drain(mut handle: Box<dyn IterationHandle>) -> Vec<Document> {
        let mut documents = Vec::new();
        while handle.advance().await.unwrap() {
            documents.push(handle.current().unwrap().clone());
        }
        documents
    }

    #[tokio::test]
    async fn queries_filter_sort_page_and_project() {
        let store = seeded().await;
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "age": -1 });
        options.skip = Some(1);
        options.limit = Some(-5);
        options.projection = Some(doc! { "name": 1, "_id": 0 });

        let handle = store
            .execute_query(&users(), doc! { "team": "core" }, options)
            .await
            .unwrap();

        assert_eq!(drain(handle).await, vec![doc! { "name": "ada" }]);
    }

    #[tokio::test]
    async fn handles_report_server_and_cursor_id() {
        let store = InMemoryStore::builder().port(27018).build().await.unwrap();
        store
            .execute_bulk_write(
                &users(),
                vec![
                    WriteModel::InsertOne { document: doc! { "n": 1 } },
                    WriteModel::InsertOne { document: doc! { "n": 2 } },
                ],
                BulkWriteOptions::default(),
            )
            .await
            .unwrap();

        let mut handle = store
            .execute_query(&users(), doc! {}, FindOptions::default())
            .await
            .unwrap();

        assert_eq!(handle.server_info().unwrap().address(), "localhost:27018");
        assert!(handle.cursor_id() > 0);
        assert!(handle.advance().await.unwrap());
        assert!(handle.current().unwrap().get_object_id("_id").is_ok());
        assert!(!handle.is_dead());
        assert!(handle.advance().await.unwrap());
        assert!(handle.is_dead());
        assert_eq!(handle.cursor_id(), 0);
        assert!(!handle.advance().await.unwrap());
    }

    #[tokio::test]
    async fn malformed_filters_are_bad_values() {
        let store = seeded().await;
        let error = store
            .execute_query(&users(), doc! { "$where": "1" }, FindOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.kind, DriverErrorKind::Command);
        assert_eq!(error.code, Some(2));
    }

    #[tokio::test]
    async fn count_honors_skip_and_limit() {
        let store = seeded().await;
        let options = CountOptions {
            skip: Some(1),
            limit: Some(1),
            ..CountOptions::default()
        };

        assert_eq!(store.count(&users(), doc! {}, CountOptions::default()).await.unwrap(), 3);
        assert_eq!(store.count(&users(), doc! { "team": "core" }, options).await.unwrap(), 1);
        assert_eq!(
            store.count(&Namespace::new("app", "none"), doc! {}, CountOptions::default()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn ordered_bulk_writes_stop_at_the_first_error() {
        let store = seeded().await;
        let models = vec![
            WriteModel::InsertOne { document: doc! { "_id": 4 } },
            WriteModel::InsertOne { document: doc! { "_id": 1 } },
            WriteModel::InsertOne { document: doc! { "_id": 5 } },
        ];

        let error = store
            .execute_bulk_write(&users(), models, BulkWriteOptions::default())
            .await
            .unwrap_err();
        let failure = error.bulk_failure().unwrap();

        assert_eq!(failure.partial.inserted_count, 1);
        assert_eq!(failure.write_errors.len(), 1);
        assert_eq!(failure.write_errors[0].index, 1);
        assert_eq!(failure.write_errors[0].code, 11000);
        assert_eq!(store.documents(&users()).await.len(), 4);
    }

    #[tokio::test]
    async fn unordered_bulk_writes_continue_past_errors() {
        let store = seeded().await;
        let models = vec![
            WriteModel::InsertOne { document: doc! { "_id": 1 } },
            WriteModel::InsertOne { document: doc! { "_id": 4 } },
            WriteModel::UpdateOne {
                filter: doc! { "_id": 2 },
                update: doc! { "$inc": { "name": 1 } },
                upsert: false,
            },
            WriteModel::InsertOne { document: doc! { "_id": 5 } },
        ];
        let options = BulkWriteOptions {
            ordered: false,
            write_concern: None,
        };

        let error = store.execute_bulk_write(&users(), models, options).await.unwrap_err();
        let failure = error.bulk_failure().unwrap();

        assert_eq!(failure.partial.inserted_count, 2);
        let failed: Vec<_> = failure.write_errors.iter().map(|e| (e.index, e.code)).collect();
        assert_eq!(failed, vec![(0, 11000), (2, 14)]);
    }

    #[tokio::test]
    async fn updates_count_matches_modifications_and_upserts() {
        let store = seeded().await;
        let models = vec![
            WriteModel::UpdateMany {
                filter: doc! { "team": "core" },
                update: doc! { "$set": { "age": 45 } },
                upsert: false,
            },
            WriteModel::ReplaceOne {
                filter: doc! { "_id": 3 },
                replacement: doc! { "name": "linus", "team": "git" },
                upsert: false,
            },
            WriteModel::UpdateOne {
                filter: doc! { "name": "ken", "age": { "$gt": 70 } },
                update: doc! { "$set": { "team": "unix" } },
                upsert: true,
            },
        ];

        let result = store
            .execute_bulk_write(&users(), models, BulkWriteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.matched_count, 3);
        assert_eq!(result.modified_count, 2);
        assert_eq!(result.upserted_count, 1);
        assert_eq!(result.upserted[0].index, 2);

        let documents = store.documents(&users()).await;
        assert_eq!(documents[2], doc! { "_id": 3, "name": "linus", "team": "git" });
        assert_eq!(documents[3].get_str("name").unwrap(), "ken");
        assert_eq!(documents[3].get_str("team").unwrap(), "unix");
        assert_eq!(documents[3].get("_id"), Some(&result.upserted[0].id));
    }

    #[tokio::test]
    async fn deletes_remove_one_or_many() {
        let store = seeded().await;
        let models = vec![
            WriteModel::DeleteOne { filter: doc! { "team": "core" } },
            WriteModel::DeleteMany { filter: doc! { "age": { "$lt": 100 } } },
        ];

        let result = store
            .execute_bulk_write(&users(), models, BulkWriteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.deleted_count, 3);
        assert!(store.documents(&users()).await.is_empty());
    }

    #[tokio::test]
    async fn unsatisfiable_write_concerns_are_reported_after_the_writes() {
        let store = InMemoryStore::new();
        let options = BulkWriteOptions {
            ordered: true,
            write_concern: Some(WriteConcern::new(Acknowledgment::Nodes(3), 0)),
        };

        let error = store
            .execute_bulk_write(&users(), vec![WriteModel::InsertOne { document: doc! { "_id": 1 } }], options)
            .await
            .unwrap_err();
        let failure = error.bulk_failure().unwrap();

        assert_eq!(failure.partial.inserted_count, 1);
        assert!(failure.write_errors.is_empty());
        assert_eq!(failure.write_concern_error.as_ref().unwrap().code, 100);
    }

    #[tokio::test]
    async fn aggregate_runs_pipeline_stages() {
        let store = seeded().await;
        let command = doc! {
            "aggregate": "users",
            "pipeline": [
                { "$match": { "team": "core" } },
                { "$sort": { "age": 1 } },
                { "$project": { "name": 1 } },
                { "$limit": 1 },
            ],
            "cursor": {},
        };

        let handle = store
            .execute_command("app", command, CommandOptions::default())
            .await
            .unwrap();
        assert_eq!(drain(handle).await, vec![doc! { "_id": 1, "name": "ada" }]);

        let count = doc! { "aggregate": "users", "pipeline": [{ "$count": "n" }], "cursor": {} };
        let handle = store.execute_command("app", count, CommandOptions::default()).await.unwrap();
        assert_eq!(drain(handle).await, vec![doc! { "n": 3 }]);
    }

    #[tokio::test]
    async fn command_failures_carry_server_codes() {
        let store = seeded().await;
        let code = |result: DriverResult<Box<dyn IterationHandle>>| result.unwrap_err().code;

        let no_cursor = doc! { "aggregate": "users", "pipeline": [] };
        assert_eq!(code(store.execute_command("app", no_cursor, CommandOptions::default()).await), Some(9));

        let bad_stage = doc! { "aggregate": "users", "pipeline": [{ "$lookup": {} }], "cursor": {} };
        assert_eq!(code(store.execute_command("app", bad_stage, CommandOptions::default()).await), Some(40324));

        let unknown = doc! { "frobnicate": 1 };
        assert_eq!(code(store.execute_command("app", unknown, CommandOptions::default()).await), Some(59));
    }

    #[tokio::test]
    async fn list_collections_is_scoped_to_the_database() {
        let store = seeded().await;
        store
            .execute_bulk_write(
                &Namespace::new("other", "things"),
                vec![WriteModel::InsertOne { document: doc! { "_id": 1 } }],
                BulkWriteOptions::default(),
            )
            .await
            .unwrap();

        let handle = store
            .execute_command("app", doc! { "listCollections": 1 }, CommandOptions::default())
            .await
            .unwrap();

        assert_eq!(drain(handle).await, vec![doc! { "name": "users", "type": "collection" }]);
    }
}
