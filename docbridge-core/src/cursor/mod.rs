//! Lazy, option-accumulating cursors.
//!
//! A cursor starts out *building*: its mutators only record options. The first
//! access to its results (`current`, `valid`, `key`, `next`, `has_next`,
//! `rewind`, or `count(true)` on an iterating cursor) converts everything into
//! one frozen request, submits it to the backend and keeps the returned
//! [`IterationHandle`](crate::backend::IterationHandle). From then on every
//! mutator fails with [`BridgeError::CursorAlreadyOpen`] until the cursor is
//! [`reset`](Cursor::reset).
//!
//! - [`Cursor`] wraps a find request.
//! - [`CommandCursor`] wraps a cursor-returning command such as `aggregate`.

mod command;
mod query;

pub use command::CommandCursor;
pub use query::Cursor;

use bson::{Bson, Document};
use serde::Serialize;
use std::{collections::VecDeque, time::Duration};

use crate::{
    backend::{DriverResult, IterationHandle},
    convert::{Framing, to_legacy, to_legacy_with},
    error::{BridgeError, BridgeResult, DriverError},
    legacy::LegacyValue,
    taxonomy::{ErrorCategory, map_error},
};

/// Classifies a failure raised while opening or iterating a cursor.
pub(crate) fn cursor_error(error: DriverError) -> BridgeError {
    map_error(error, ErrorCategory::Cursor).into()
}

/// A legacy `maxTimeMS` value; zero and negative values mean "no limit".
pub(crate) fn max_time(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

pub(crate) fn document_to_legacy(document: &Document, framing: Framing) -> LegacyValue {
    to_legacy_with(&Bson::Document(document.clone()), framing)
}

/// The two phases of a cursor: options being accumulated, or a frozen request
/// being iterated.
#[derive(Debug)]
pub(crate) enum Phase<S, R> {
    Building(S),
    Open {
        spec: S,
        request: R,
        iteration: Iteration,
    },
}

impl<S, R> Phase<S, R> {
    pub(crate) fn spec(&self) -> &S {
        match self {
            Phase::Building(spec) => spec,
            Phase::Open { spec, .. } => spec,
        }
    }

    /// The mutable options, or [`BridgeError::CursorAlreadyOpen`] once iterating.
    pub(crate) fn spec_mut(&mut self) -> BridgeResult<&mut S> {
        match self {
            Phase::Building(spec) => Ok(spec),
            Phase::Open { .. } => Err(BridgeError::CursorAlreadyOpen),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Phase::Open { .. })
    }

    pub(crate) fn iteration(&self) -> Option<&Iteration> {
        match self {
            Phase::Open { iteration, .. } => Some(iteration),
            Phase::Building(_) => None,
        }
    }

    pub(crate) fn iteration_mut(&mut self) -> Option<&mut Iteration> {
        match self {
            Phase::Open { iteration, .. } => Some(iteration),
            Phase::Building(_) => None,
        }
    }

    /// The iteration of an open cursor.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidValue`] while the cursor is still being built.
    pub(crate) fn live(&mut self) -> BridgeResult<&mut Iteration> {
        self.iteration_mut()
            .ok_or_else(|| BridgeError::InvalidValue("cursor has not been opened".to_string()))
    }

    pub(crate) fn request(&self) -> Option<&R> {
        match self {
            Phase::Open { request, .. } => Some(request),
            Phase::Building(_) => None,
        }
    }
}

impl<S: Clone, R> Phase<S, R> {
    /// Moves to the open phase with a frozen request and its live iteration.
    pub(crate) fn open(&mut self, request: R, iteration: Iteration) {
        let spec = self.spec().clone();
        *self = Phase::Open {
            spec,
            request,
            iteration,
        };
    }

    /// Swaps in a fresh iteration over the same frozen request.
    pub(crate) fn restart(&mut self, fresh: Iteration) {
        if let Phase::Open { iteration, .. } = self {
            *iteration = fresh;
        }
    }

    /// Drops the iteration handle and returns to the building phase.
    pub(crate) fn reset(&mut self) {
        if let Phase::Open { spec, .. } = self {
            *self = Phase::Building(spec.clone());
        }
    }
}

/// Iteration state over a live handle.
///
/// `current` is the document the cursor is positioned on. `buffered` holds
/// documents already pulled from the handle but not yet reached (filled by
/// look-ahead and by draining for a count).
#[derive(Debug)]
pub(crate) struct Iteration {
    handle: Box<dyn IterationHandle>,
    current: Option<Document>,
    buffered: VecDeque<Document>,
    started: bool,
    position: usize,
    consumed: usize,
    fetched: usize,
}

impl Iteration {
    pub(crate) fn new(handle: Box<dyn IterationHandle>) -> Self {
        Self {
            handle,
            current: None,
            buffered: VecDeque::new(),
            started: false,
            position: 0,
            consumed: 0,
            fetched: 0,
        }
    }

    async fn fetch(&mut self) -> DriverResult<Option<Document>> {
        if self.handle.advance().await? {
            self.fetched += 1;
            return Ok(self.handle.current().cloned());
        }

        Ok(None)
    }

    async fn pull(&mut self) -> DriverResult<Option<Document>> {
        let next = match self.buffered.pop_front() {
            Some(doc) => Some(doc),
            None => self.fetch().await?,
        };

        if next.is_some() {
            self.consumed += 1;
        }

        Ok(next)
    }

    /// Positions on the first document if iteration has not started yet.
    pub(crate) async fn start(&mut self) -> DriverResult<()> {
        if !self.started {
            self.started = true;
            self.position = 0;
            self.current = self.pull().await?;
        }

        Ok(())
    }

    /// Moves to the next document; the first call lands on the first document.
    pub(crate) async fn advance(&mut self) -> DriverResult<()> {
        if !self.started {
            return self.start().await;
        }

        if self.current.is_some() {
            self.current = self.pull().await?;
            self.position += 1;
        }

        Ok(())
    }

    /// Whether a following document exists, without moving.
    pub(crate) async fn has_next(&mut self) -> DriverResult<bool> {
        if self.started && self.current.is_none() {
            return Ok(false);
        }

        if self.buffered.is_empty() {
            if let Some(doc) = self.fetch().await? {
                self.buffered.push_back(doc);
            }
        }

        Ok(!self.buffered.is_empty())
    }

    /// Pulls every remaining document into the buffer and returns the total
    /// number of results (already consumed plus remaining).
    pub(crate) async fn drain_count(&mut self) -> DriverResult<u64> {
        while let Some(doc) = self.fetch().await? {
            self.buffered.push_back(doc);
        }

        Ok((self.consumed + self.buffered.len()) as u64)
    }

    pub(crate) fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    pub(crate) fn started(&self) -> bool {
        self.started
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.handle.is_dead() && self.buffered.is_empty()
    }

    /// The iteration key of the current document: its `_id` where that has a
    /// scalar form, otherwise its position.
    pub(crate) fn key(&self) -> Option<LegacyValue> {
        let current = self.current.as_ref()?;

        Some(match current.get("_id") {
            Some(Bson::ObjectId(id)) => LegacyValue::String(id.to_hex()),
            Some(
                id @ (Bson::String(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Boolean(_)),
            ) => to_legacy(id),
            _ => LegacyValue::Int(self.position as i64),
        })
    }

    pub(crate) fn snapshot(&self) -> IterationInfo {
        let server = self.handle.server_info();

        IterationInfo {
            id: self.handle.cursor_id(),
            at: self.position,
            num_returned: self.fetched,
            server: server.as_ref().map(|s| s.address()),
            host: server.as_ref().map(|s| s.host.clone()),
            port: server.as_ref().map(|s| s.port),
            connection_type_desc: server.as_ref().map(|s| s.role.connection_type_desc()),
        }
    }
}

/// Iteration metadata reported by cursor info once iteration has started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationInfo {
    pub id: i64,
    pub at: usize,
    pub num_returned: usize,
    pub server: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub connection_type_desc: Option<&'static str>,
}

/// A structured snapshot of a cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorInfo {
    pub ns: String,
    pub limit: i64,
    pub batch_size: i32,
    pub skip: u64,
    pub flags: u32,
    pub query: Document,
    pub fields: Option<Document>,
    pub started_iterating: bool,
    /// `true` for command cursors, whose iteration statistics describe the first batch.
    #[serde(skip)]
    pub command: bool,
    #[serde(flatten)]
    pub iteration: Option<IterationInfo>,
}

impl CursorInfo {
    /// Renders the legacy key layout (`batchSize`, `numReturned`, `firstBatchAt`, ..).
    pub fn to_legacy(&self) -> LegacyValue {
        let mut info = crate::legacy::LegacyArray::new()
            .with("ns", self.ns.as_str())
            .with("limit", self.limit)
            .with("batchSize", i64::from(self.batch_size))
            .with("skip", self.skip as i64)
            .with("flags", i64::from(self.flags))
            .with("query", to_legacy(&Bson::Document(self.query.clone())))
            .with(
                "fields",
                match &self.fields {
                    Some(fields) => to_legacy(&Bson::Document(fields.clone())),
                    None => LegacyValue::Null,
                },
            )
            .with("started_iterating", self.started_iterating);

        if let Some(iteration) = &self.iteration {
            let (at_key, returned_key) = if self.command {
                ("firstBatchAt", "firstBatchNumReturned")
            } else {
                ("at", "numReturned")
            };

            info.insert("id", iteration.id);
            info.insert(at_key, iteration.at as i64);
            info.insert(returned_key, iteration.num_returned as i64);

            if let (Some(server), Some(host), Some(port), Some(kind)) = (
                &iteration.server,
                &iteration.host,
                iteration.port,
                iteration.connection_type_desc,
            ) {
                info.insert("server", server.as_str());
                info.insert("host", host.as_str());
                info.insert("port", i64::from(port));
                info.insert("connection_type_desc", kind);
            }
        }

        LegacyValue::Array(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_phase_has_no_live_iteration() {
        let mut phase: Phase<(), ()> = Phase::Building(());

        assert!(!phase.is_open());
        assert!(matches!(phase.live(), Err(BridgeError::InvalidValue(_))));
        assert!(phase.spec_mut().is_ok());
    }
}
