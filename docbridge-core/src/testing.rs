//! Recording backend used by the unit tests of this crate.

use async_trait::async_trait;
use bson::{Document, doc};
use std::{collections::VecDeque, sync::Mutex};

use crate::{
    backend::{
        BulkWriteResult, DriverResult, IterationHandle, ServerInfo, ServerRole, StoreBackend,
        WriteModel,
    },
    error::DriverError,
    options::{BulkWriteOptions, CommandOptions, CountOptions, FindOptions, Namespace},
};

pub(crate) fn users() -> Vec<Document> {
    vec![
        doc! { "_id": "u1", "name": "ada", "age": 36 },
        doc! { "_id": "u2", "name": "grace", "age": 45 },
        doc! { "_id": "u3", "name": "linus", "age": 30 },
    ]
}

#[derive(Debug)]
pub(crate) struct VecHandle {
    remaining: VecDeque<Document>,
    current: Option<Document>,
}

impl VecHandle {
    pub(crate) fn new(documents: Vec<Document>) -> Self {
        Self {
            remaining: documents.into(),
            current: None,
        }
    }
}

#[async_trait]
impl IterationHandle for VecHandle {
    async fn advance(&mut self) -> DriverResult<bool> {
        self.current = self.remaining.pop_front();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    fn is_dead(&self) -> bool {
        self.remaining.is_empty()
    }

    fn server_info(&self) -> Option<ServerInfo> {
        Some(ServerInfo {
            host: "localhost".into(),
            port: 27017,
            role: ServerRole::Standalone,
        })
    }

    fn cursor_id(&self) -> i64 {
        if self.remaining.is_empty() { 0 } else { 42 }
    }
}

/// Serves a fixed result set and records every request it receives.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    documents: Vec<Document>,
    failure: Option<DriverError>,
    bulk_outcome: Mutex<Option<DriverResult<BulkWriteResult>>>,
    queries: Mutex<Vec<(Document, FindOptions)>>,
    counts: Mutex<Vec<CountOptions>>,
    commands: Mutex<Vec<(String, Document, CommandOptions)>>,
    writes: Mutex<Vec<(Vec<WriteModel>, BulkWriteOptions)>>,
}

impl FakeBackend {
    pub(crate) fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub(crate) fn failing(error: DriverError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// The outcome of the next bulk write.
    pub(crate) fn respond_to_bulk_write(&self, outcome: DriverResult<BulkWriteResult>) {
        *self.bulk_outcome.lock().unwrap() = Some(outcome);
    }

    pub(crate) fn queries(&self) -> Vec<(Document, FindOptions)> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn counts(&self) -> Vec<CountOptions> {
        self.counts.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<(String, Document, CommandOptions)> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(Vec<WriteModel>, BulkWriteOptions)> {
        self.writes.lock().unwrap().clone()
    }

    fn check(&self) -> DriverResult<()> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreBackend for FakeBackend {
    async fn execute_query(
        &self,
        _namespace: &Namespace,
        filter: Document,
        options: FindOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        self.queries.lock().unwrap().push((filter, options.clone()));
        self.check()?;

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };

        let documents = self.documents.iter().skip(skip).take(limit).cloned().collect();
        Ok(Box::new(VecHandle::new(documents)))
    }

    async fn execute_command(
        &self,
        database: &str,
        command: Document,
        options: CommandOptions,
    ) -> DriverResult<Box<dyn IterationHandle>> {
        self.commands
            .lock()
            .unwrap()
            .push((database.to_string(), command, options));
        self.check()?;

        Ok(Box::new(VecHandle::new(self.documents.clone())))
    }

    async fn execute_bulk_write(
        &self,
        _namespace: &Namespace,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
    ) -> DriverResult<BulkWriteResult> {
        self.writes.lock().unwrap().push((models.clone(), options));
        self.check()?;

        if let Some(outcome) = self.bulk_outcome.lock().unwrap().take() {
            return outcome;
        }

        let inserted = models
            .iter()
            .filter(|model| matches!(model, WriteModel::InsertOne { .. }))
            .count() as u64;

        Ok(BulkWriteResult {
            inserted_count: inserted,
            ..BulkWriteResult::default()
        })
    }

    async fn count(
        &self,
        _namespace: &Namespace,
        _filter: Document,
        options: CountOptions,
    ) -> DriverResult<u64> {
        self.counts.lock().unwrap().push(options);
        self.check()?;

        Ok(self.documents.len() as u64)
    }
}
