//! Homogeneous write batches executed as one bulk write.
//!
//! A [`WriteBatch`] accumulates insert, update or delete descriptors (one kind
//! per batch), validates each one as it is added and submits them all with
//! [`WriteBatch::execute`].
//!
//! # Examples
//!
//! ```ignore
//! use docbridge::batch::{BatchKind, WriteOptions};
//!
//! let mut batch = collection.batch(BatchKind::Insert);
//! batch.add(&LegacyValue::Array(LegacyArray::new().with("name", "ada")))?;
//! batch.add(&LegacyValue::Array(LegacyArray::new().with("name", "grace")))?;
//!
//! let result = batch.execute(&WriteOptions::default()).await?;
//! assert_eq!(result.inserted, 2);
//! ```
//!
//! A batch is exclusively owned; it offers no synchronization of its own.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::{
    backend::{BulkWriteResult, StoreBackend, WriteModel},
    convert::{document_from_legacy, to_legacy},
    error::{BridgeError, BridgeResult, BulkWriteFailure, WriteConcernError, WriteError},
    legacy::{LegacyArray, LegacyValue},
    options::{BulkWriteOptions, Namespace},
    params::{Acknowledgment, WriteConcern, normalize_write_concern},
    taxonomy::{ErrorCategory, map_error},
};

/// The kind of every item in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchKind::Insert => "insert",
            BatchKind::Update => "update",
            BatchKind::Delete => "delete",
        })
    }
}

/// A validated write descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Insert(Document),
    Update {
        query: Document,
        update: Document,
        multi: bool,
        upsert: bool,
    },
    Delete {
        query: Document,
        /// `0` removes every match, `1` removes the first.
        limit: u32,
    },
}

impl BatchItem {
    pub fn kind(&self) -> BatchKind {
        match self {
            BatchItem::Insert(_) => BatchKind::Insert,
            BatchItem::Update { .. } => BatchKind::Update,
            BatchItem::Delete { .. } => BatchKind::Delete,
        }
    }

    fn validate(&self) -> BridgeResult<()> {
        match self {
            BatchItem::Insert(_) => Ok(()),
            BatchItem::Update { update, multi, .. } => match update_shape(update)? {
                UpdateShape::Replacement if *multi => Err(BridgeError::InvalidBatchItem(
                    "multi update requires update operators, got a replacement document".into(),
                )),
                _ => Ok(()),
            },
            BatchItem::Delete { limit, .. } if *limit > 1 => Err(BridgeError::InvalidBatchItem(
                format!("delete limit must be 0 or 1, got {limit}"),
            )),
            BatchItem::Delete { .. } => Ok(()),
        }
    }

    /// The bulk write operation this item is submitted as.
    fn to_model(&self) -> WriteModel {
        match self.clone() {
            BatchItem::Insert(document) => WriteModel::InsertOne { document },
            BatchItem::Update {
                query,
                update,
                multi,
                upsert,
            } => match (multi, is_replacement(&update)) {
                (true, _) => WriteModel::UpdateMany {
                    filter: query,
                    update,
                    upsert,
                },
                (false, true) => WriteModel::ReplaceOne {
                    filter: query,
                    replacement: update,
                    upsert,
                },
                (false, false) => WriteModel::UpdateOne {
                    filter: query,
                    update,
                    upsert,
                },
            },
            BatchItem::Delete { query, limit: 0 } => WriteModel::DeleteMany { filter: query },
            BatchItem::Delete { query, .. } => WriteModel::DeleteOne { filter: query },
        }
    }
}

enum UpdateShape {
    Operators,
    Replacement,
}

fn update_shape(update: &Document) -> BridgeResult<UpdateShape> {
    let operators = update.keys().filter(|key| key.starts_with('$')).count();

    match operators {
        0 => Ok(UpdateShape::Replacement),
        n if n == update.len() => Ok(UpdateShape::Operators),
        _ => Err(BridgeError::InvalidBatchItem(
            "update document mixes operators and plain fields".into(),
        )),
    }
}

fn is_replacement(update: &Document) -> bool {
    matches!(update_shape(update), Ok(UpdateShape::Replacement))
}

/// Call-time options of [`WriteBatch::execute`]. Unset fields fall back to the
/// batch defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub w: Option<Acknowledgment>,
    pub timeout_ms: Option<u64>,
    pub ordered: Option<bool>,
    /// Deprecated; logged and dropped.
    pub fsync: Option<bool>,
    /// Deprecated; logged and dropped.
    pub journal: Option<bool>,
}

impl WriteOptions {
    /// Reads the legacy `{w, wtimeout, ordered, fsync, j}` options array.
    ///
    /// An unusable `w` is logged and ignored, like any rejected write concern.
    pub fn from_legacy(options: &LegacyValue) -> Self {
        let mut parsed = WriteOptions::default();

        if let Some(w) = options.member("w") {
            match normalize_write_concern(&w, 0) {
                Ok(concern) => parsed.w = Some(concern.w),
                Err(warning) => warn!(%warning, "ignoring write concern"),
            }
        }

        parsed.timeout_ms = options
            .member("wtimeout")
            .and_then(|t| t.as_i64())
            .map(|t| t.max(0) as u64);
        parsed.ordered = options.member("ordered").and_then(|o| truthy(&o));
        parsed.fsync = options.member("fsync").and_then(|f| truthy(&f));
        parsed.journal = options.member("j").and_then(|j| truthy(&j));

        parsed
    }
}

/// An item of a batch result that created a document.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertedItem {
    pub index: usize,
    pub id: Bson,
}

/// Aggregated outcome of [`WriteBatch::execute`].
///
/// A partially failed batch is still a result: `ok` is `false` and the failed
/// items are listed in `write_errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    pub removed: u64,
    pub upserted_items: Vec<UpsertedItem>,
    pub write_errors: Vec<WriteError>,
    pub write_concern_errors: Vec<WriteConcernError>,
    pub ok: bool,
}

impl BatchResult {
    fn from_counts(result: BulkWriteResult) -> Self {
        Self {
            inserted: result.inserted_count,
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_count,
            removed: result.deleted_count,
            upserted_items: result
                .upserted
                .into_iter()
                .map(|u| UpsertedItem {
                    index: u.index,
                    id: u.id,
                })
                .collect(),
            write_errors: Vec::new(),
            write_concern_errors: Vec::new(),
            ok: true,
        }
    }

    fn from_failure(failure: BulkWriteFailure) -> Self {
        Self {
            write_errors: failure.write_errors,
            write_concern_errors: failure.write_concern_error.into_iter().collect(),
            ok: false,
            ..Self::from_counts(failure.partial)
        }
    }

    /// Renders the legacy result array (`nInserted`, `nMatched`, `writeErrors`, ..).
    pub fn to_legacy(&self) -> LegacyValue {
        let mut result = LegacyArray::new()
            .with("nInserted", self.inserted as i64)
            .with("nMatched", self.matched as i64)
            .with("nModified", self.modified as i64)
            .with("nUpserted", self.upserted as i64)
            .with("nRemoved", self.removed as i64);

        if !self.upserted_items.is_empty() {
            let upserted = self
                .upserted_items
                .iter()
                .map(|item| {
                    LegacyValue::Array(
                        LegacyArray::new()
                            .with("index", item.index as i64)
                            .with("_id", to_legacy(&item.id)),
                    )
                })
                .collect::<LegacyArray>();
            result.insert("upserted", upserted);
        }

        if !self.write_errors.is_empty() {
            let errors = self
                .write_errors
                .iter()
                .map(|error| {
                    LegacyValue::Array(
                        LegacyArray::new()
                            .with("index", error.index as i64)
                            .with("code", error.code)
                            .with("errmsg", error.message.as_str()),
                    )
                })
                .collect::<LegacyArray>();
            result.insert("writeErrors", errors);
        }

        if let Some(error) = self.write_concern_errors.first() {
            result.insert(
                "writeConcernError",
                LegacyArray::new()
                    .with("code", error.code)
                    .with("errmsg", error.message.as_str()),
            );
        }

        result.insert("ok", self.ok);
        LegacyValue::Array(result)
    }
}

/// A batch of write descriptors of one kind.
#[derive(Debug)]
pub struct WriteBatch<'a, B: StoreBackend> {
    backend: &'a B,
    namespace: Namespace,
    kind: BatchKind,
    items: Vec<BatchItem>,
    write_concern: WriteConcern,
    ordered: bool,
}

impl<'a, B: StoreBackend> WriteBatch<'a, B> {
    /// Creates an empty, ordered batch with the default write concern.
    pub fn new(backend: &'a B, namespace: Namespace, kind: BatchKind) -> Self {
        Self {
            backend,
            namespace,
            kind,
            items: Vec::new(),
            write_concern: WriteConcern::default(),
            ordered: true,
        }
    }

    /// Sets the batch-level write concern that call-time options override.
    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validates a legacy descriptor and appends it.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - A document for inserts; `{q, u, multi?, upsert?}` for
    ///   updates; `{q, limit}` for deletes
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidBatchItem`] when the descriptor does not
    /// have the shape this batch's kind requires. Nothing is appended then.
    pub fn add(&mut self, descriptor: &LegacyValue) -> BridgeResult<()> {
        let item = match self.kind {
            BatchKind::Insert => BatchItem::Insert(required_document(Some(descriptor.clone()), "insert document")?),
            BatchKind::Update => BatchItem::Update {
                query: required_document(descriptor.member("q"), "update query 'q'")?,
                update: required_document(descriptor.member("u"), "update document 'u'")?,
                multi: optional_flag(descriptor, "multi")?,
                upsert: optional_flag(descriptor, "upsert")?,
            },
            BatchKind::Delete => {
                let limit = descriptor
                    .member("limit")
                    .and_then(|limit| limit.as_i64())
                    .ok_or_else(|| BridgeError::InvalidBatchItem("delete requires an integer 'limit'".into()))?;

                BatchItem::Delete {
                    query: required_document(descriptor.member("q"), "delete query 'q'")?,
                    limit: u32::try_from(limit).map_err(|_| {
                        BridgeError::InvalidBatchItem(format!("delete limit must be 0 or 1, got {limit}"))
                    })?,
                }
            }
        };

        self.add_item(item)
    }

    /// Validates a typed item and appends it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidBatchItem`] for an item of another kind or
    /// with an invalid shape.
    pub fn add_item(&mut self, item: BatchItem) -> BridgeResult<()> {
        if item.kind() != self.kind {
            return Err(BridgeError::InvalidBatchItem(format!(
                "cannot add a {} item to a {} batch",
                item.kind(),
                self.kind
            )));
        }

        item.validate()?;
        self.items.push(item);
        Ok(())
    }

    /// Submits every item as one bulk write.
    ///
    /// Call-time options win over the batch defaults field by field. An empty
    /// batch returns a zero result without contacting the store. On success
    /// the items are cleared; when some items fail the result has
    /// `ok == false` and the items are kept.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Legacy`] for store failures other than a partial
    /// bulk write. The items are kept.
    pub async fn execute(&mut self, options: &WriteOptions) -> BridgeResult<BatchResult> {
        if options.fsync.is_some() || options.journal.is_some() {
            warn!(namespace = %self.namespace, "ignoring deprecated fsync/j write options");
        }

        if self.items.is_empty() {
            return Ok(BatchResult::from_counts(BulkWriteResult::default()));
        }

        let write_concern = WriteConcern {
            w: options.w.clone().unwrap_or_else(|| self.write_concern.w.clone()),
            timeout_ms: options.timeout_ms.unwrap_or(self.write_concern.timeout_ms),
        };
        let ordered = options.ordered.unwrap_or(self.ordered);
        let models = self.items.iter().map(BatchItem::to_model).collect();

        debug!(
            namespace = %self.namespace,
            kind = %self.kind,
            items = self.items.len(),
            ordered,
            "executing write batch"
        );

        let outcome = self
            .backend
            .execute_bulk_write(
                &self.namespace,
                models,
                BulkWriteOptions {
                    ordered,
                    write_concern: Some(write_concern),
                },
            )
            .await;

        match outcome {
            Ok(result) => {
                self.items.clear();
                Ok(BatchResult::from_counts(result))
            }
            Err(error) => match error.bulk_failure().cloned() {
                Some(failure) => Ok(BatchResult::from_failure(failure)),
                None => Err(map_error(error, ErrorCategory::Cursor).into()),
            },
        }
    }
}

fn required_document(value: Option<LegacyValue>, what: &str) -> BridgeResult<Document> {
    match value {
        Some(value) if value.is_document_like() => document_from_legacy(&value),
        Some(value) => Err(BridgeError::InvalidBatchItem(format!(
            "{what} must be a document, got {}",
            value.type_name()
        ))),
        None => Err(BridgeError::InvalidBatchItem(format!("{what} is required"))),
    }
}

fn optional_flag(descriptor: &LegacyValue, name: &str) -> BridgeResult<bool> {
    match descriptor.member(name) {
        None => Ok(false),
        Some(value) => truthy(&value).ok_or_else(|| {
            BridgeError::InvalidBatchItem(format!(
                "'{name}' must be a boolean, got {}",
                value.type_name()
            ))
        }),
    }
}

fn truthy(value: &LegacyValue) -> Option<bool> {
    value
        .as_bool()
        .or_else(|| value.as_i64().map(|n| n != 0))
}
