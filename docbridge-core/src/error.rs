//! Error types and result types for bridge operations.
//!
//! Two families of errors live here:
//!
//! - [`BridgeError`] is returned by every fallible bridge operation. Validation
//!   failures (field names, cursor mutation after open, malformed batch items)
//!   are raised directly; failures coming from the document store are always
//!   classified first and arrive as [`BridgeError::Legacy`].
//! - [`DriverError`] is the error type a [`StoreBackend`](crate::backend::StoreBackend)
//!   reports. It is never handed to callers unclassified.

use bson::{Bson, error::Error as BsonError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::{backend::BulkWriteResult, taxonomy::LegacyError};

/// Represents all possible errors raised by the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A projection field list contained something other than a string.
    #[error("Field name error: {0}")]
    FieldName(String),
    /// A query-shaping mutator was called after the cursor started iterating.
    #[error("Cursor already open: cannot modify a cursor after iteration has started")]
    CursorAlreadyOpen,
    /// A write descriptor did not match the shape its batch kind requires.
    #[error("Invalid batch item: {0}")]
    InvalidBatchItem(String),
    /// A value could not be represented on the other side of the bridge.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    /// Serialization/deserialization error when converting through BSON or JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The bridge configuration was rejected.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A document store failure, reclassified into the legacy taxonomy.
    #[error(transparent)]
    Legacy(#[from] LegacyError),
}

/// A specialized `Result` type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BsonError> for BridgeError {
    fn from(err: BsonError) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for BridgeError {
    fn from(err: SerdeJsonError) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

/// One failed item of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    /// Position of the failed item in the submitted operation list.
    pub index: usize,
    /// Server error code (11000 for duplicate key).
    pub code: i32,
    /// Human readable error message.
    pub message: String,
}

/// A write concern that could not be satisfied for a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcernError {
    pub code: i32,
    pub message: String,
}

/// Partial outcome attached to a failed bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteFailure {
    /// Counters for the items that did succeed before (or around) the failures.
    pub partial: BulkWriteResult,
    /// Per-item failures, in submission order.
    pub write_errors: Vec<WriteError>,
    /// Write concern failure, if any.
    pub write_concern_error: Option<WriteConcernError>,
}

/// The kind of failure a document store driver reported.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverErrorKind {
    /// Credentials were rejected.
    Authentication,
    /// A connection could not be established or was lost.
    Connection,
    /// Establishing a connection or selecting a server timed out.
    ConnectionTimeout,
    /// TLS negotiation failed.
    SslConnection,
    /// A bulk write completed partially.
    BulkWrite(BulkWriteFailure),
    /// A single write failed.
    Write,
    /// The server aborted an operation that exceeded its max time.
    ExecutionTimeout,
    /// A server command failed for another reason.
    Command,
    /// Anything the driver did not classify.
    Other,
}

/// The error type a [`StoreBackend`](crate::backend::StoreBackend) reports.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    pub code: Option<i32>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attaches a numeric server error code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn command(code: i32, message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Command, message).with_code(code)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Other, message)
    }

    /// Builds a bulk write failure carrying its partial result.
    pub fn bulk_write(failure: BulkWriteFailure) -> Self {
        let message = match failure.write_errors.first() {
            Some(first) => format!(
                "BulkWriteException: {} write error(s), first at index {}: {}",
                failure.write_errors.len(),
                first.index,
                first.message
            ),
            None => match &failure.write_concern_error {
                Some(wc) => format!("BulkWriteException: write concern error: {}", wc.message),
                None => "BulkWriteException".to_string(),
            },
        };
        let code = failure
            .write_errors
            .first()
            .map(|e| e.code)
            .or_else(|| failure.write_concern_error.as_ref().map(|e| e.code));

        Self {
            kind: DriverErrorKind::BulkWrite(failure),
            message,
            code,
        }
    }

    /// Returns the partial bulk result when this is a bulk write failure.
    pub fn bulk_failure(&self) -> Option<&BulkWriteFailure> {
        match &self.kind {
            DriverErrorKind::BulkWrite(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<BsonError> for DriverError {
    fn from(err: BsonError) -> Self {
        DriverError::other(err.to_string())
    }
}

/// Non-fatal rejection of a read preference or write concern input.
///
/// Returned when legacy parameters cannot be normalized; the caller keeps its
/// previous state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamWarning {
    #[error("invalid read preference mode: {0}")]
    UnknownReadPreferenceMode(String),
    #[error("non-empty tag set provided with read preference mode 'primary'")]
    TagsWithPrimary,
    #[error("invalid tag set: {0}")]
    InvalidTagSet(String),
    #[error("invalid value for write concern 'w': {0}")]
    InvalidW(Bson),
}
