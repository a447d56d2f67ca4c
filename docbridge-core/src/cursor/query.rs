use bson::Document;
use tracing::{debug, warn};

use crate::{
    backend::{IterationHandle, StoreBackend},
    config::BridgeConfig,
    convert::{Framing, convert_projection, document_from_legacy, from_legacy},
    cursor::{CursorInfo, Iteration, Phase, cursor_error, document_to_legacy, max_time},
    error::{BridgeError, BridgeResult},
    legacy::LegacyValue,
    options::{CountOptions, CursorType, FindOptions, Hint, Namespace},
    params::ReadPreference,
    taxonomy::{ErrorCategory, map_error},
};

// Wire protocol query flag bit positions accepted by `set_flag`.
const FLAG_TAILABLE: u8 = 1;
const FLAG_SLAVE_OK: u8 = 2;
const FLAG_NO_CURSOR_TIMEOUT: u8 = 4;
const FLAG_AWAIT_DATA: u8 = 5;
const FLAG_PARTIAL: u8 = 7;

/// Options accumulated while a [`Cursor`] is building.
#[derive(Debug, Clone, Default)]
pub(crate) struct QuerySpec {
    query: LegacyValue,
    fields: LegacyValue,
    sort: Option<Document>,
    skip: u64,
    limit: i64,
    batch_size: i32,
    tailable: bool,
    await_data: bool,
    no_timeout: bool,
    partial: bool,
    max_time_ms: i64,
    hint: Option<Hint>,
    modifiers: Document,
    read_preference: ReadPreference,
}

impl QuerySpec {
    fn flags(&self) -> u32 {
        [
            (self.tailable, FLAG_TAILABLE),
            (self.read_preference.slave_okay(), FLAG_SLAVE_OK),
            (self.no_timeout, FLAG_NO_CURSOR_TIMEOUT),
            (self.await_data, FLAG_AWAIT_DATA),
            (self.partial, FLAG_PARTIAL),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |flags, (_, bit)| flags | 1 << bit)
    }

    /// Converts the accumulated options into the request submitted on open.
    fn freeze(&self) -> BridgeResult<FrozenQuery> {
        let filter = document_from_legacy(&self.query)?;
        let projection = convert_projection(&self.fields)?;

        let mut options = FindOptions::default();
        options.projection = (!projection.is_empty()).then_some(projection);
        options.sort = self.sort.clone().filter(|sort| !sort.is_empty());
        options.skip = (self.skip > 0).then_some(self.skip);
        // a negative batch size asks for a single batch, like a negative limit
        options.limit = match (self.limit, self.batch_size) {
            (0, batch_size) if batch_size < 0 => Some(i64::from(batch_size)),
            (0, _) => None,
            (limit, _) => Some(limit),
        };
        options.batch_size = (self.batch_size != 0).then(|| self.batch_size.unsigned_abs());
        options.cursor_type = match (self.tailable, self.await_data) {
            (true, true) => Some(CursorType::TailableAwait),
            (true, false) => Some(CursorType::Tailable),
            (false, _) => None,
        };
        options.no_cursor_timeout = self.no_timeout;
        options.allow_partial_results = self.partial;
        options.max_time = max_time(self.max_time_ms);
        options.hint = self.hint.clone();
        options.modifiers = self.modifiers.clone();
        options.read_preference = Some(self.read_preference.clone());

        Ok(FrozenQuery { filter, options })
    }
}

/// The request a [`Cursor`] submitted when it opened.
#[derive(Debug, Clone)]
pub(crate) struct FrozenQuery {
    filter: Document,
    options: FindOptions,
}

/// A lazily executed find request.
///
/// Mutators (`sort`, `skip`, `limit`, ..) only record options and fail with
/// [`BridgeError::CursorAlreadyOpen`] once the cursor has been opened by one of
/// the iteration methods. [`reset`](Self::reset) returns it to the building
/// phase; [`rewind`](Self::rewind) re-executes the same frozen request.
///
/// # Examples
///
/// ```ignore
/// let mut cursor = collection.find(filter, LegacyValue::Null)?;
/// cursor.sort(&sort)?.limit(10)?;
///
/// cursor.rewind().await?;
/// while let Some(document) = cursor.current().await? {
///     println!("{:?}", document);
///     cursor.next().await?;
/// }
/// ```
#[derive(Debug)]
pub struct Cursor<'a, B: StoreBackend> {
    backend: &'a B,
    namespace: Namespace,
    framing: Framing,
    phase: Phase<QuerySpec, FrozenQuery>,
}

impl<'a, B: StoreBackend> Cursor<'a, B> {
    /// Creates a building cursor over `namespace`.
    ///
    /// # Arguments
    ///
    /// * `backend` - The store the request is submitted to on open
    /// * `namespace` - The collection to query
    /// * `query` - The legacy filter; `Null` matches everything
    /// * `fields` - The legacy field selection; `Null` returns whole documents
    pub fn new(backend: &'a B, namespace: Namespace, query: LegacyValue, fields: LegacyValue) -> Self {
        Self {
            backend,
            namespace,
            framing: Framing::default(),
            phase: Phase::Building(QuerySpec {
                query,
                fields,
                ..QuerySpec::default()
            }),
        }
    }

    /// Seeds a fresh cursor with connection-level defaults.
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

    /// Whether the request has been submitted.
    pub fn is_open(&self) -> bool {
        self.phase.is_open()
    }

    /// Sets how result documents are framed. May be changed at any time.
    pub fn framing(&mut self, framing: Framing) -> &mut Self {
        self.framing = framing;
        self
    }

    // ── Building ────────────────────────────────────────────────────────

    pub fn filter(&mut self, query: LegacyValue) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.query = query;
        Ok(self)
    }

    pub fn fields(&mut self, fields: LegacyValue) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.fields = fields;
        Ok(self)
    }

    pub fn sort(&mut self, sort: &LegacyValue) -> BridgeResult<&mut Self> {
        let spec = self.phase.spec_mut()?;
        spec.sort = Some(document_from_legacy(sort)?);
        Ok(self)
    }

    pub fn skip(&mut self, skip: u64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.skip = skip;
        Ok(self)
    }

    /// Limits the number of results. A negative limit returns a single batch of
    /// `|limit|` documents and closes the cursor.
    pub fn limit(&mut self, limit: i64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.limit = limit;
        Ok(self)
    }

    pub fn batch_size(&mut self, batch_size: i32) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.batch_size = batch_size;
        Ok(self)
    }

    pub fn tailable(&mut self, tailable: bool) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.tailable = tailable;
        Ok(self)
    }

    /// Lets a tailable cursor block waiting for new documents. Ignored on a
    /// non-tailable cursor.
    pub fn await_data(&mut self, await_data: bool) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.await_data = await_data;
        Ok(self)
    }

    pub fn no_timeout(&mut self, no_timeout: bool) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.no_timeout = no_timeout;
        Ok(self)
    }

    /// Legacy alias of [`no_timeout`](Self::no_timeout).
    pub fn immortal(&mut self, immortal: bool) -> BridgeResult<&mut Self> {
        self.no_timeout(immortal)
    }

    /// Accepts partial results when some shards are down.
    pub fn partial(&mut self, partial: bool) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.partial = partial;
        Ok(self)
    }

    /// Server side time limit in milliseconds; `0` removes the limit.
    pub fn max_time_ms(&mut self, ms: i64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.max_time_ms = ms;
        Ok(self)
    }

    /// Sets the index hint, by name (a string) or by key pattern (a container).
    /// `Null` clears it.
    pub fn hint(&mut self, index: &LegacyValue) -> BridgeResult<&mut Self> {
        let spec = self.phase.spec_mut()?;
        spec.hint = hint_from_legacy(index)?;
        Ok(self)
    }

    /// Adds a legacy query modifier.
    ///
    /// `$orderby`, `$hint`, `$maxTimeMS` and `$query` update the matching
    /// option; anything else is passed to the backend as a modifier.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CursorAlreadyOpen`] once open and
    /// [`BridgeError::InvalidValue`] when the value has the wrong shape.
    pub fn add_option(&mut self, name: &str, value: &LegacyValue) -> BridgeResult<&mut Self> {
        let spec = self.phase.spec_mut()?;

        match name.trim_start_matches('$') {
            "orderby" => spec.sort = Some(document_from_legacy(value)?),
            "hint" => spec.hint = hint_from_legacy(value)?,
            "maxTimeMS" => {
                spec.max_time_ms = value.as_i64().ok_or_else(|| {
                    BridgeError::InvalidValue(format!("$maxTimeMS must be an integer, got {}", value.type_name()))
                })?;
            }
            "query" => spec.query = value.clone(),
            modifier => {
                spec.modifiers.insert(format!("${modifier}"), from_legacy(value)?);
            }
        }

        Ok(self)
    }

    /// Applies a legacy read preference. Returns `false` (and keeps the current
    /// preference) when the pair is rejected.
    pub fn set_read_preference(&mut self, mode: &str, tag_sets: &LegacyValue) -> BridgeResult<bool> {
        Ok(self.phase.spec_mut()?.read_preference.update(mode, tag_sets))
    }

    pub fn slave_okay(&mut self, ok: bool) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?.read_preference.set_slave_okay(ok);
        Ok(self)
    }

    /// Sets or clears a wire protocol query flag by bit position.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidValue`] for bits the bridge cannot honor
    /// (oplog replay, exhaust and unknown bits).
    pub fn set_flag(&mut self, bit: u8, on: bool) -> BridgeResult<&mut Self> {
        let spec = self.phase.spec_mut()?;

        match bit {
            FLAG_TAILABLE => spec.tailable = on,
            FLAG_SLAVE_OK => spec.read_preference.set_slave_okay(on),
            FLAG_NO_CURSOR_TIMEOUT => spec.no_timeout = on,
            FLAG_AWAIT_DATA => spec.await_data = on,
            FLAG_PARTIAL => spec.partial = on,
            other => {
                return Err(BridgeError::InvalidValue(format!(
                    "unsupported cursor flag bit {other}"
                )));
            }
        }

        Ok(self)
    }

    /// Client side timeouts have no modern counterpart; the request is logged and ignored.
    pub fn timeout(&mut self, ms: i64) -> BridgeResult<&mut Self> {
        self.phase.spec_mut()?;
        warn!(namespace = %self.namespace, timeout_ms = ms, "ignoring client side cursor timeout");
        Ok(self)
    }

    pub fn read_preference(&self) -> &ReadPreference {
        &self.phase.spec().read_preference
    }

    // ── Iteration ───────────────────────────────────────────────────────

    async fn execute(&self, request: &FrozenQuery) -> BridgeResult<Box<dyn IterationHandle>> {
        debug!(namespace = %self.namespace, filter = %request.filter, "executing query");

        self.backend
            .execute_query(&self.namespace, request.filter.clone(), request.options.clone())
            .await
            .map_err(cursor_error)
    }

    /// Freezes the options and submits the request, once.
    async fn open(&mut self) -> BridgeResult<&mut Iteration> {
        if let Phase::Building(spec) = &self.phase {
            let request = spec.freeze()?;
            let handle = self.execute(&request).await?;
            self.phase.open(request, Iteration::new(handle));
        }

        self.phase.live()
    }

    /// Opens the cursor and positions it on the first result.
    async fn positioned(&mut self) -> BridgeResult<&mut Iteration> {
        let iteration = self.open().await?;
        iteration.start().await.map_err(cursor_error)?;
        Ok(iteration)
    }

    /// The document the cursor is positioned on, or `None` past the end.
    pub async fn current(&mut self) -> BridgeResult<Option<LegacyValue>> {
        let framing = self.framing;
        let iteration = self.positioned().await?;
        Ok(iteration.current().map(|doc| document_to_legacy(doc, framing)))
    }

    pub async fn valid(&mut self) -> BridgeResult<bool> {
        Ok(self.positioned().await?.current().is_some())
    }

    /// The key of the current document: its `_id` when it has a scalar form,
    /// otherwise its position in the result set.
    pub async fn key(&mut self) -> BridgeResult<Option<LegacyValue>> {
        Ok(self.positioned().await?.key())
    }

    /// Advances to the next result. On a cursor that has not started iterating,
    /// lands on the first result.
    pub async fn next(&mut self) -> BridgeResult<()> {
        self.open().await?.advance().await.map_err(cursor_error)
    }

    /// Advances and returns the new current document.
    pub async fn get_next(&mut self) -> BridgeResult<Option<LegacyValue>> {
        self.next().await?;
        let framing = self.framing;
        Ok(self
            .phase
            .live()?
            .current()
            .map(|doc| document_to_legacy(doc, framing)))
    }

    /// Whether another result follows, without moving the cursor.
    pub async fn has_next(&mut self) -> BridgeResult<bool> {
        self.open().await?.has_next().await.map_err(cursor_error)
    }

    /// Re-executes the frozen request, or opens the cursor, and positions it on
    /// the first result.
    pub async fn rewind(&mut self) -> BridgeResult<()> {
        if let Some(request) = self.phase.request() {
            let handle = self.execute(request).await?;
            self.phase.restart(Iteration::new(handle));
        }

        self.positioned().await.map(|_| ())
    }

    /// Drops the live handle and returns to the building phase. Options are kept.
    pub fn reset(&mut self) {
        self.phase.reset();
    }

    /// Whether the cursor has been opened and its results are exhausted.
    pub fn dead(&self) -> bool {
        self.phase.iteration().is_some_and(Iteration::is_dead)
    }

    /// Drains the remaining results into a vector, starting from the first one.
    pub async fn to_vec(&mut self) -> BridgeResult<Vec<LegacyValue>> {
        self.rewind().await?;

        let mut results = Vec::new();
        while let Some(document) = self.current().await? {
            results.push(document);
            self.next().await?;
        }

        Ok(results)
    }

    /// Counts results.
    ///
    /// With `found_only == false` a count request is issued for the filter
    /// alone. With `found_only == true`, skip and limit are honored: an open
    /// cursor is drained (the drained documents stay available to iteration)
    /// and a building cursor issues a count request. Hint and max time always
    /// apply.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Legacy`] when the count request fails.
    pub async fn count(&mut self, found_only: bool) -> BridgeResult<u64> {
        if found_only {
            if let Some(iteration) = self.phase.iteration_mut() {
                return iteration.drain_count().await.map_err(cursor_error);
            }
        }

        let spec = self.phase.spec();
        let filter = document_from_legacy(&spec.query)?;

        let mut options = CountOptions {
            hint: spec.hint.clone(),
            max_time: max_time(spec.max_time_ms),
            read_preference: Some(spec.read_preference.clone()),
            ..CountOptions::default()
        };
        if found_only {
            options.skip = (spec.skip > 0).then_some(spec.skip);
            options.limit = (spec.limit != 0).then(|| spec.limit.unsigned_abs());
        }

        debug!(namespace = %self.namespace, found_only, "counting");

        self.backend
            .count(&self.namespace, filter, options)
            .await
            .map_err(|e| map_error(e, ErrorCategory::Result).into())
    }

    /// A snapshot of the request parameters and, once iterating, of the
    /// iteration state.
    ///
    /// # Errors
    ///
    /// On a building cursor the filter and fields are converted for the
    /// snapshot; conversion failures are returned.
    pub fn info(&self) -> BridgeResult<CursorInfo> {
        let spec = self.phase.spec();

        let (query, fields) = match self.phase.request() {
            Some(request) => (request.filter.clone(), request.options.projection.clone()),
            None => {
                let projection = convert_projection(&spec.fields)?;
                (
                    document_from_legacy(&spec.query)?,
                    (!projection.is_empty()).then_some(projection),
                )
            }
        };

        let iteration = self.phase.iteration().filter(|i| i.started());

        Ok(CursorInfo {
            ns: self.namespace.to_string(),
            limit: spec.limit,
            batch_size: spec.batch_size,
            skip: spec.skip,
            flags: spec.flags(),
            query,
            fields,
            started_iterating: iteration.is_some(),
            command: false,
            iteration: iteration.map(Iteration::snapshot),
        })
    }
}

fn hint_from_legacy(index: &LegacyValue) -> BridgeResult<Option<Hint>> {
    match index {
        value if value.is_null() => Ok(None),
        value if value.is_document_like() => Ok(Some(Hint::Keys(document_from_legacy(value)?))),
        value => match value.as_str() {
            Some(name) => Ok(Some(Hint::Name(name.to_string()))),
            None => Err(BridgeError::InvalidValue(format!(
                "index hint must be a name or a key pattern, got {}",
                value.type_name()
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        legacy::LegacyArray,
        testing::{FakeBackend, users},
    };
    use bson::doc;
    use std::time::Duration;

    fn cursor(backend: &FakeBackend) -> Cursor<'_, FakeBackend> {
        Cursor::new(
            backend,
            Namespace::new("app", "users"),
            LegacyValue::Null,
            LegacyValue::Null,
        )
    }

    #[tokio::test]
    async fn mutators_fail_once_open() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        cursor.limit(2).unwrap().skip(1).unwrap();
        assert!(!cursor.is_open());

        cursor.current().await.unwrap();
        assert!(cursor.is_open());

        assert!(matches!(cursor.limit(5), Err(BridgeError::CursorAlreadyOpen)));
        assert!(matches!(cursor.skip(5), Err(BridgeError::CursorAlreadyOpen)));
        assert!(matches!(
            cursor.sort(&LegacyValue::Null),
            Err(BridgeError::CursorAlreadyOpen)
        ));
        assert!(matches!(
            cursor.set_read_preference("nearest", &LegacyValue::Null),
            Err(BridgeError::CursorAlreadyOpen)
        ));
        assert!(matches!(cursor.timeout(5), Err(BridgeError::CursorAlreadyOpen)));

        cursor.reset();
        assert!(cursor.timeout(5).is_ok());
    }

    #[tokio::test]
    async fn open_freezes_a_single_request() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = Cursor::new(
            &backend,
            Namespace::new("app", "users"),
            LegacyValue::Array(LegacyArray::new().with("age", 30)),
            LegacyValue::list(["name".into()]),
        );

        cursor
            .sort(&LegacyValue::Array(LegacyArray::new().with("age", -1)))
            .unwrap()
            .skip(1)
            .unwrap()
            .batch_size(50)
            .unwrap()
            .tailable(true)
            .unwrap()
            .await_data(true)
            .unwrap()
            .max_time_ms(250)
            .unwrap()
            .hint(&"age_1".into())
            .unwrap()
            .add_option("$comment", &"audit".into())
            .unwrap();

        cursor.valid().await.unwrap();
        cursor.next().await.unwrap();

        let queries = backend.queries();
        assert_eq!(queries.len(), 1);

        let (filter, options) = &queries[0];
        assert_eq!(filter, &doc! { "age": 30 });
        assert_eq!(options.projection, Some(doc! { "name": true }));
        assert_eq!(options.sort, Some(doc! { "age": -1 }));
        assert_eq!(options.skip, Some(1));
        assert_eq!(options.limit, None);
        assert_eq!(options.batch_size, Some(50));
        assert_eq!(options.cursor_type, Some(CursorType::TailableAwait));
        assert_eq!(options.max_time, Some(Duration::from_millis(250)));
        assert_eq!(options.hint, Some(Hint::Name("age_1".into())));
        assert_eq!(options.modifiers, doc! { "$comment": "audit" });
        assert_eq!(options.read_preference, Some(ReadPreference::primary()));
    }

    #[tokio::test]
    async fn await_data_alone_is_not_tailable() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.await_data(true).unwrap();
        cursor.valid().await.unwrap();

        assert_eq!(backend.queries()[0].1.cursor_type, None);
    }

    #[tokio::test]
    async fn negative_batch_size_becomes_single_batch_limit() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.batch_size(-2).unwrap();
        cursor.valid().await.unwrap();

        let options = &backend.queries()[0].1;
        assert_eq!(options.limit, Some(-2));
        assert_eq!(options.batch_size, Some(2));
    }

    #[tokio::test]
    async fn iteration_walks_results_in_order() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        let first = cursor.get_next().await.unwrap().unwrap();
        assert_eq!(first.member("name"), Some("ada".into()));
        assert_eq!(cursor.key().await.unwrap(), Some("u1".into()));

        assert!(cursor.has_next().await.unwrap());
        let second = cursor.get_next().await.unwrap().unwrap();
        assert_eq!(second.member("name"), Some("grace".into()));

        cursor.next().await.unwrap();
        cursor.next().await.unwrap();
        assert!(!cursor.valid().await.unwrap());
        assert!(!cursor.has_next().await.unwrap());
        assert!(cursor.dead());
    }

    #[tokio::test]
    async fn has_next_on_fresh_cursor_does_not_skip_the_first_result() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        assert!(cursor.has_next().await.unwrap());
        let first = cursor.get_next().await.unwrap().unwrap();
        assert_eq!(first.member("name"), Some("ada".into()));
    }

    #[tokio::test]
    async fn rewind_reexecutes_the_frozen_request() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.limit(2).unwrap();

        let first = cursor.current().await.unwrap();
        cursor.next().await.unwrap();
        cursor.rewind().await.unwrap();

        assert_eq!(cursor.current().await.unwrap(), first);

        let queries = backend.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], queries[1]);
    }

    #[tokio::test]
    async fn reset_allows_mutation_again() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.current().await.unwrap();

        cursor.reset();
        assert!(!cursor.is_open());
        cursor.limit(1).unwrap();

        assert_eq!(cursor.to_vec().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn key_falls_back_to_position() {
        let backend = FakeBackend::with_documents(vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        let mut cursor = cursor(&backend);

        cursor.next().await.unwrap();
        cursor.next().await.unwrap();
        assert_eq!(cursor.key().await.unwrap(), Some(LegacyValue::Int(1)));
    }

    #[tokio::test]
    async fn count_honors_skip_and_limit_only_when_found_only() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.skip(1).unwrap().limit(-2).unwrap().max_time_ms(10).unwrap();

        cursor.count(false).await.unwrap();
        cursor.count(true).await.unwrap();

        let counts = backend.counts();
        assert_eq!(counts[0].skip, None);
        assert_eq!(counts[0].limit, None);
        assert_eq!(counts[0].max_time, Some(Duration::from_millis(10)));
        assert_eq!(counts[1].skip, Some(1));
        assert_eq!(counts[1].limit, Some(2));
    }

    #[tokio::test]
    async fn found_only_count_on_open_cursor_drains_without_losing_results() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        cursor.current().await.unwrap();
        assert_eq!(cursor.count(true).await.unwrap(), 3);
        assert!(backend.counts().is_empty());

        cursor.next().await.unwrap();
        let second = cursor.current().await.unwrap().unwrap();
        assert_eq!(second.member("name"), Some("grace".into()));
    }

    #[tokio::test]
    async fn set_flag_maps_wire_bits() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        cursor.set_flag(1, true).unwrap().set_flag(2, true).unwrap().set_flag(7, true).unwrap();
        assert!(cursor.read_preference().slave_okay());
        assert!(matches!(cursor.set_flag(6, true), Err(BridgeError::InvalidValue(_))));

        let info = cursor.info().unwrap();
        assert_eq!(info.flags, 2 | 4 | 128);
        assert!(!info.started_iterating);
        assert_eq!(info.iteration, None);
    }

    #[tokio::test]
    async fn info_reports_iteration_state_once_started() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);
        cursor.current().await.unwrap();

        let info = cursor.info().unwrap();
        assert!(info.started_iterating);

        let iteration = info.iteration.clone().unwrap();
        assert_eq!(iteration.at, 0);
        assert_eq!(iteration.num_returned, 1);
        assert_eq!(iteration.server.as_deref(), Some("localhost:27017"));
        assert_eq!(iteration.connection_type_desc, Some("STANDALONE"));

        let legacy = info.to_legacy();
        assert_eq!(legacy.member("ns"), Some("app.users".into()));
        assert_eq!(legacy.member("numReturned"), Some(LegacyValue::Int(1)));
        assert_eq!(legacy.member("firstBatchAt"), None);
    }

    #[tokio::test]
    async fn execution_failures_are_classified() {
        let backend = FakeBackend::failing(crate::error::DriverError::connection(
            "No suitable servers found (`serverSelectionTryOnce` set)",
        ));
        let mut cursor = cursor(&backend);

        match cursor.current().await {
            Err(BridgeError::Legacy(error)) => assert_eq!(error.category, ErrorCategory::Connection),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!cursor.is_open());
    }

    #[tokio::test]
    async fn add_option_routes_known_modifiers() {
        let backend = FakeBackend::with_documents(users());
        let mut cursor = cursor(&backend);

        cursor
            .add_option("$orderby", &LegacyValue::Array(LegacyArray::new().with("name", 1)))
            .unwrap()
            .add_option("$maxTimeMS", &LegacyValue::Int(5))
            .unwrap();
        cursor.valid().await.unwrap();

        let options = &backend.queries()[0].1;
        assert_eq!(options.sort, Some(doc! { "name": 1 }));
        assert_eq!(options.max_time, Some(Duration::from_millis(5)));
        assert!(options.modifiers.is_empty());
    }
}
