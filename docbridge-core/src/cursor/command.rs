use bson::{Bson, Document};
use tracing::{debug, warn};

use crate::{
    backend::{IterationHandle, StoreBackend},
    config::BridgeConfig,
    convert::{Framing, document_from_legacy},
    cursor::{CursorInfo, Iteration, Phase, cursor_error, document_to_legacy, max_time},
    error::BridgeResult,
    legacy::LegacyValue,
    options::{CommandOptions, Namespace},
    params::ReadPreference,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct CommandSpec {
    command: LegacyValue,
    batch_size: i32,
    max_time_ms: i64,
    read_preference: ReadPreference,
}

impl CommandSpec {
    /// Converts the command, normalizing a `cursor: true` or empty cursor
    /// marker into an explicit options document.
    fn freeze(&self) -> BridgeResult<Document> {
        let mut command = document_from_legacy(&self.command)?;

        if let Some(cursor) = command.get_mut("cursor") {
            if is_empty_marker(cursor) {
                *cursor = Bson::Document(Document::new());
            }

            if let Bson::Document(options) = cursor {
                if self.batch_size != 0 && !options.contains_key("batchSize") {
                    options.insert("batchSize", self.batch_size.abs());
                }
            }
        }

        Ok(command)
    }
}

fn is_empty_marker(cursor: &Bson) -> bool {
    match cursor {
        Bson::Boolean(true) => true,
        Bson::Array(values) => values.is_empty(),
        Bson::Document(options) => options.is_empty(),
        _ => false,
    }
}

/// A cursor over the results of a cursor-returning command (`aggregate`,
/// `listCollections`, ..).
///
/// Follows the same building/open life cycle as [`Cursor`](crate::cursor::Cursor).
/// Its [`info`](Self::info) reports first-batch statistics.
#[derive(Debug)]
pub struct CommandCursor<'a, B: StoreBackend> {
    backend: &'a B,
    namespace: Namespace,
    framing: Framing,
    phase: Phase<CommandSpec, Document>,
}

impl<'a, B: StoreBackend> CommandCursor<'a, B> {
    /// Creates a building command cursor.
    ///
    /// # Arguments
    ///
    /// * `backend` - The store the command is submitted to on open
    /// * `namespace` - The namespace reported by [`info`](Self::info); the
    ///   command runs against its database
    /// * `command` - The legacy command document
    pub fn new(backend: &'a B, namespace: Namespace, command: LegacyValue) -> Self {
        Self {
            backend,
            namespace,
            framing: Framing::default(),
            phase: Phase::Building(CommandSpec {
                command,
                ..CommandSpec::default()
            }),
        }
    }

    pub(crate) fn with_defaults(mut self, config: &BridgeConfig) -> Self {
        if let Phase::Building(spec) = &mut self.phase {
            spec.batch_size = config.batch_size;
            spec.max_time_ms = config.max_time_ms;
            spec.read_preference = config.read_preference.clone();
        }
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_open(&self) -> bool {
        self.phase.is_open()
    }

    pub fn framing(&mut self, framing: Framing) -> &mut Self {
        self.framing = framing;
        self
    }

    pub fn batch_size(&mut self, batch_size: i32) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.batch_size = batch_size;
        Ok(self)
    }

    pub fn max_time_ms(&mut self, ms: i64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.max_time_ms = ms;
        Ok(self)
    }

    pub fn set_read_preference(&mut self, mode: &str, tag_sets: &LegacyValue) -> BridgeResult<bool> {
        Ok(self.phase.spec_mut()?.read_preference.update(mode, tag_sets))
    }

    pub fn read_preference(&self) -> &ReadPreference {
        &self.phase.spec().read_preference
    }

    pub fn timeout(&mut self, ms: i64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?;
        warn!(namespace = %self.namespace, timeout_ms = ms, "ignoring client side cursor timeout");
        Ok(self)
    }

    async fn execute(&self, command: &Document) -> BridgeResult<Box<dyn IterationHandle>> {
        let spec = self.phase.spec();
        let options = CommandOptions {
            batch_size: (spec.batch_size != 0).then(|| spec.batch_size.unsigned_abs()),
            max_time: max_time(spec.max_time_ms),
            read_preference: Some(spec.read_preference.clone()),
        };

        debug!(
            database = %self.namespace.database,
            command = command.keys().next().map(String::as_str).unwrap_or_default(),
            "running cursor command"
        );

        self.backend
            .execute_command(&self.namespace.database, command.clone(), options)
            .await
            .map_err(cursor_error)
    }

    async fn open(&mut self) -> BridgeResult<&mut Iteration> {
        if let Phase::Building(spec) = &self.phase {
            let command = spec.freeze()?;
            let handle = self.execute(&command).await?;
            self.phase.open(command, Iteration::new(handle));
        }

        self.phase.live()
    }

    async fn positioned(&mut self) -> BridgeResult<&mut Iteration> {
        let iteration = self.open().await?;
        iteration.start().await.map_err(cursor_error)?;
        Ok(iteration)
    }

    pub async fn current(&mut self) -> BridgeResult<Option<LegacyValue>> {
        let framing = self.framing;
        let iteration = self.positioned().await?;
        Ok(iteration.current().map(|doc| document_to_legacy(doc, framing)))
    }

    pub async fn valid(&mut self) -> BridgeResult<bool> {
        Ok(self.positioned().await?.current().is_some())
    }

    pub async fn key(&mut self) -> BridgeResult<Option<LegacyValue>> {
        Ok(self.positioned().await?.key())
    }

    pub async fn next(&mut self) -> BridgeResult<()> {
        self.open().await?.advance().await.map_err(cursor_error)
    }

    /// Re-runs the command and positions on its first result.
    pub async fn rewind(&mut self) -> BridgeResult<()> {
        if let Some(command) = self.phase.request() {
            let handle = self.execute(command).await?;
            self.phase.restart(Iteration::new(handle));
        }

        self.positioned().await.map(|_| ())
    }

    pub fn reset(&mut self) {
        self.phase.reset();
    }

    pub fn dead(&self) -> bool {
        self.phase.iteration().is_some_and(Iteration::is_dead)
    }

    pub async fn to_vec(&mut self) -> BridgeResult<Vec<LegacyValue>> {
        self.rewind().await?;

        let mut results = Vec::new();
        while let Some(document) = self.current().await? {
            results.push(document);
            self.next().await?;
        }

        Ok(results)
    }

    pub fn info(&self) -> BridgeResult<CursorInfo> {
        let spec = self.phase.spec();
        let command = match self.phase.request() {
            Some(command) => command.clone(),
            None => spec.freeze()?,
        };
        let iteration = self.phase.iteration().filter(|i| i.started());

        Ok(CursorInfo {
            ns: self.namespace.to_string(),
            limit: 0,
            batch_size: spec.batch_size,
            skip: 0,
            flags: 0,
            query: command,
            fields: None,
            started_iterating: iteration.is_some(),
            command: true,
            iteration: iteration.map(Iteration::snapshot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::BridgeError,
        legacy::LegacyArray,
        testing::{FakeBackend, users},
    };
    use bson::doc;

    fn aggregate(cursor_marker: LegacyValue) -> LegacyValue {
        LegacyValue::Array(
            LegacyArray::new()
                .with("aggregate", "users")
                .with("pipeline", LegacyValue::list([]))
                .with("cursor", cursor_marker),
        )
    }

    #[tokio::test]
    async fn cursor_markers_are_normalized() {
        for marker in [
            LegacyValue::Bool(true),
            LegacyValue::list([]),
            LegacyValue::Object(Default::default()),
        ] {
            let backend = FakeBackend::with_documents(users());
            let mut cursor =
                CommandCursor::new(&backend, Namespace::new("app", "users"), aggregate(marker));
            cursor.valid().await.unwrap();

            let (database, command, _) = &backend.commands()[0];
            assert_eq!(database, "app");
            assert_eq!(command.get_document("cursor").unwrap(), &Document::new());
        }
    }

    #[tokio::test]
    async fn batch_size_lands_in_the_cursor_document() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = CommandCursor::new(
            &backend,
            Namespace::new("app", "users"),
            aggregate(LegacyValue::Bool(true)),
        );
        cursor.batch_size(2).unwrap().max_time_ms(100).unwrap();
        cursor.valid().await.unwrap();

        let (_, command, options) = &backend.commands()[0];
        assert_eq!(command.get_document("cursor").unwrap(), &doc! { "batchSize": 2 });
        assert_eq!(options.batch_size, Some(2));
        assert!(matches!(cursor.batch_size(5), Err(BridgeError::CursorAlreadyOpen)));
    }

    #[tokio::test]
    async fn timeout_is_only_accepted_while_building() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = CommandCursor::new(
            &backend,
            Namespace::new("app", "users"),
            aggregate(LegacyValue::Bool(true)),
        );

        assert!(cursor.timeout(100).is_ok());
        cursor.valid().await.unwrap();
        assert!(matches!(cursor.timeout(100), Err(BridgeError::CursorAlreadyOpen)));
    }

    #[tokio::test]
    async fn explicit_cursor_options_are_kept() {
        let backend = FakeBackend::with_documents(users());
        let marker = LegacyValue::Array(LegacyArray::new().with("batchSize", 1));
        let mut cursor = CommandCursor::new(&backend, Namespace::new("app", "users"), aggregate(marker));
        cursor.batch_size(10).unwrap();
        cursor.valid().await.unwrap();

        let (_, command, _) = &backend.commands()[0];
        assert_eq!(command.get_document("cursor").unwrap(), &doc! { "batchSize": 1 });
    }

    #[tokio::test]
    async fn info_relabels_first_batch_statistics() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = CommandCursor::new(
            &backend,
            Namespace::new("app", "users"),
            aggregate(LegacyValue::Bool(true)),
        );

        let before = cursor.info().unwrap();
        assert!(!before.started_iterating);
        assert_eq!(before.skip, 0);
        assert_eq!(before.fields, None);

        assert_eq!(cursor.to_vec().await.unwrap().len(), 3);

        let legacy = cursor.info().unwrap().to_legacy();
        assert_eq!(legacy.member("firstBatchNumReturned"), Some(LegacyValue::Int(3)));
        assert_eq!(legacy.member("limit"), Some(LegacyValue::Int(0)));
        assert_eq!(legacy.member("numReturned"), None);
        assert!(cursor.dead());
    }
}
