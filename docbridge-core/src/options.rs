//! Request options handed to a [`StoreBackend`](crate::backend::StoreBackend).
//!
//! These are the frozen forms of what cursors and batches accumulate: by the
//! time a backend sees them every legacy value has already crossed the bridge.

use bson::{Bson, Document};
use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::BridgeError,
    params::{ReadPreference, WriteConcern},
};

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for Namespace {
    type Err = BridgeError;

    /// Splits on the first `.`; collection names may contain further dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
                Ok(Self::new(database, collection))
            }
            _ => Err(BridgeError::InvalidValue(format!("invalid namespace: {s}"))),
        }
    }
}

/// How a cursor behaves once it reaches the end of a capped collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    /// Stays open and returns new documents on later iteration.
    Tailable,
    /// Tailable, and the server blocks for a while waiting for new documents.
    TailableAwait,
}

/// An index hint, by key pattern or by index name.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Keys(Document),
    Name(String),
}

impl Hint {
    pub fn to_bson(&self) -> Bson {
        match self {
            Hint::Keys(keys) => Bson::Document(keys.clone()),
            Hint::Name(name) => Bson::String(name.clone()),
        }
    }
}

/// Options of a find request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    /// A negative limit asks for a single batch of `|limit|` documents.
    pub limit: Option<i64>,
    pub batch_size: Option<u32>,
    /// `None` for a regular, non-tailable cursor.
    pub cursor_type: Option<CursorType>,
    pub no_cursor_timeout: bool,
    pub allow_partial_results: bool,
    pub max_time: Option<Duration>,
    pub hint: Option<Hint>,
    /// Additional query modifiers (`$comment`, `$min`, `$max`, ..).
    pub modifiers: Document,
    pub read_preference: Option<ReadPreference>,
}

/// Options of a count request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub hint: Option<Hint>,
    pub max_time: Option<Duration>,
    pub read_preference: Option<ReadPreference>,
}

/// Options of a cursor-returning command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    pub batch_size: Option<u32>,
    pub max_time: Option<Duration>,
    pub read_preference: Option<ReadPreference>,
}

/// Options of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteOptions {
    /// Stop at the first failing item when `true`.
    pub ordered: bool,
    pub write_concern: Option<WriteConcern>,
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        Self {
            ordered: true,
            write_concern: None,
        }
    }
}
