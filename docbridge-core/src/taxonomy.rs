//! Classification of document store failures into legacy error categories.
//!
//! Every [`DriverError`] a backend reports goes through [`map_error`] before a
//! caller sees it. The mapped [`LegacyError`] keeps the original message and
//! code and exposes the driver error as its `source()`.

use std::fmt;
use thiserror::Error;

use crate::error::{DriverError, DriverErrorKind};

const NO_SUITABLE_SERVERS: &str = "No suitable servers found";

/// Legacy error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication, connection, connection timeout and TLS failures.
    Connection,
    /// Bulk write and write failures, and anything raised while iterating.
    Cursor,
    /// The server gave up on an operation after its max time.
    ExecutionTimeout,
    WriteConcern,
    DuplicateKey,
    Result,
    Protocol,
    /// The generic legacy exception.
    General,
}

impl ErrorCategory {
    /// Returns the class name the legacy API used for this category.
    pub fn legacy_name(&self) -> &'static str {
        match self {
            ErrorCategory::Connection => "MongoConnectionException",
            ErrorCategory::Cursor => "MongoCursorException",
            ErrorCategory::ExecutionTimeout => "MongoExecutionTimeoutException",
            ErrorCategory::WriteConcern => "MongoWriteConcernException",
            ErrorCategory::DuplicateKey => "MongoDuplicateKeyException",
            ErrorCategory::Result => "MongoResultException",
            ErrorCategory::Protocol => "MongoProtocolException",
            ErrorCategory::General => "MongoException",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.legacy_name())
    }
}

/// A document store failure expressed in the legacy taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{category}: {message}")]
pub struct LegacyError {
    pub category: ErrorCategory,
    pub message: String,
    pub code: Option<i32>,
    #[source]
    pub cause: DriverError,
}

impl LegacyError {
    /// The partial bulk result carried by the cause, if any.
    pub fn bulk_failure(&self) -> Option<&crate::error::BulkWriteFailure> {
        self.cause.bulk_failure()
    }
}

/// Classifies `error`, using `fallback` for kinds with no dedicated category.
pub fn map_error(error: DriverError, fallback: ErrorCategory) -> LegacyError {
    let category = if error.message.contains(NO_SUITABLE_SERVERS) {
        ErrorCategory::Connection
    } else {
        classify(&error.kind).unwrap_or(fallback)
    };

    LegacyError {
        category,
        message: error.message.clone(),
        code: error.code,
        cause: error,
    }
}

fn classify(kind: &DriverErrorKind) -> Option<ErrorCategory> {
    match kind {
        DriverErrorKind::Authentication
        | DriverErrorKind::Connection
        | DriverErrorKind::ConnectionTimeout
        | DriverErrorKind::SslConnection => Some(ErrorCategory::Connection),
        DriverErrorKind::BulkWrite(_) | DriverErrorKind::Write => Some(ErrorCategory::Cursor),
        DriverErrorKind::ExecutionTimeout => Some(ErrorCategory::ExecutionTimeout),
        DriverErrorKind::Command | DriverErrorKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BulkWriteFailure;
    use std::error::Error as _;

    #[test]
    fn connection_family_maps_to_connection() {
        for kind in [
            DriverErrorKind::Authentication,
            DriverErrorKind::Connection,
            DriverErrorKind::ConnectionTimeout,
            DriverErrorKind::SslConnection,
        ] {
            let mapped = map_error(DriverError::new(kind, "boom"), ErrorCategory::General);
            assert_eq!(mapped.category, ErrorCategory::Connection);
        }
    }

    #[test]
    fn bulk_write_maps_to_cursor() {
        let error = DriverError::bulk_write(BulkWriteFailure::default());
        assert_eq!(map_error(error, ErrorCategory::General).category, ErrorCategory::Cursor);

        let write = DriverError::new(DriverErrorKind::Write, "E11000").with_code(11000);
        assert_eq!(map_error(write, ErrorCategory::General).category, ErrorCategory::Cursor);
    }

    #[test]
    fn execution_timeout_keeps_its_category() {
        let error = DriverError::new(DriverErrorKind::ExecutionTimeout, "operation exceeded time limit")
            .with_code(50);
        let mapped = map_error(error, ErrorCategory::Cursor);
        assert_eq!(mapped.category, ErrorCategory::ExecutionTimeout);
        assert_eq!(mapped.code, Some(50));
    }

    #[test]
    fn unclassified_errors_use_the_fallback() {
        let mapped = map_error(DriverError::command(26, "ns not found"), ErrorCategory::Result);
        assert_eq!(mapped.category, ErrorCategory::Result);
    }

    #[test]
    fn no_suitable_servers_always_means_connection() {
        let error = DriverError::bulk_write(BulkWriteFailure::default());
        let error = DriverError {
            message: "No suitable servers found: `serverSelectionTimeoutMS` expired".into(),
            ..error
        };

        assert_eq!(
            map_error(error, ErrorCategory::General).category,
            ErrorCategory::Connection
        );
    }

    #[test]
    fn mapped_error_preserves_message_code_and_cause() {
        let error = DriverError::command(13, "not authorized");
        let mapped = map_error(error.clone(), ErrorCategory::General);

        assert_eq!(mapped.message, "not authorized");
        assert_eq!(mapped.code, Some(13));
        assert_eq!(mapped.cause, error);
        assert_eq!(mapped.source().map(|s| s.to_string()), Some("not authorized".to_string()));
        assert_eq!(mapped.to_string(), "MongoException: not authorized");
    }
}
