use docbridge::prelude::*;
use docbridge::memory::InMemoryStore;
use serde::Deserialize;
use std::collections::BTreeMap;

fn doc(pairs: Vec<(&str, LegacyValue)>) -> LegacyValue {
    LegacyValue::Array(pairs.into_iter().collect())
}

async fn seeded() -> BridgeStore<InMemoryStore> {
    let store = BridgeStore::new(InMemoryStore::new());

    let mut batch = store.collection("app", "users").batch(BatchKind::Insert);
    for (id, name, age) in [(1_i64, "ada", 36_i64), (2, "grace", 45), (3, "linus", 28), (4, "ken", 52)] {
        batch
            .add(&doc(vec![("_id", id.into()), ("name", name.into()), ("age", age.into())]))
            .unwrap();
    }
    let result = batch.execute(&WriteOptions::default()).await.unwrap();
    assert_eq!(result.inserted, 4);

    store
}

fn names(documents: &[LegacyValue]) -> Vec<String> {
    documents
        .iter()
        .filter_map(|d| d.member("name").and_then(|n| n.as_str().map(str::to_string)))
        .collect()
}

// ── Query shaping ───────────────────────────────────────────────────────

#[tokio::test]
async fn sort_skip_limit_and_projection_shape_the_results() {
    let store = seeded().await;
    let users = store.collection("app", "users");

    let mut cursor = users.find(LegacyValue::Null, LegacyValue::list(["name".into()]));
    cursor
        .sort(&doc(vec![("age", (-1).into())]))
        .unwrap()
        .skip(1)
        .unwrap()
        .limit(2)
        .unwrap();

    let results = cursor.to_vec().await.unwrap();
    assert_eq!(names(&results), ["grace", "ada"]);

    for result in &results {
        let fields = result.as_array().unwrap();
        assert!(fields.contains_key("_id"));
        assert!(!fields.contains_key("age"));
    }
}

#[tokio::test]
async fn filters_use_legacy_operators() {
    let store = seeded().await;
    let users = store.collection("app", "users");

    let over_forty = doc(vec![("age", doc(vec![("$gt", 40.into())]))]);
    let mut cursor = users.find(over_forty, LegacyValue::Null);
    cursor.sort(&doc(vec![("name", 1.into())])).unwrap();

    assert_eq!(names(&cursor.to_vec().await.unwrap()), ["grace", "ken"]);
}

#[tokio::test]
async fn objects_framing_returns_objects() {
    let store = seeded().await;
    let mut cursor = store
        .collection("app", "users")
        .find(doc(vec![("_id", 1.into())]), LegacyValue::Null);
    cursor.framing(Framing::Objects);

    let first = cursor.current().await.unwrap().unwrap();
    assert_eq!(first.as_object().and_then(|o| o.get("name")), Some(&LegacyValue::from("ada")));
}

// ── Life cycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn options_are_frozen_once_iteration_starts() {
    let store = seeded().await;
    let mut cursor = store.collection("app", "users").find(LegacyValue::Null, LegacyValue::Null);

    cursor.limit(3).unwrap();
    assert!(cursor.valid().await.unwrap());

    assert!(matches!(cursor.limit(1), Err(BridgeError::CursorAlreadyOpen)));
    assert!(matches!(cursor.batch_size(10), Err(BridgeError::CursorAlreadyOpen)));
    assert!(matches!(cursor.slave_okay(true), Err(BridgeError::CursorAlreadyOpen)));
    assert!(matches!(
        cursor.add_option("$comment", &"late".into()),
        Err(BridgeError::CursorAlreadyOpen)
    ));
    assert_eq!(cursor.info().unwrap().limit, 3);

    cursor.reset();
    assert!(!cursor.is_open());
    cursor.limit(1).unwrap();
    assert_eq!(cursor.to_vec().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rewind_restarts_from_the_first_result() {
    let store = seeded().await;
    let mut cursor = store.collection("app", "users").find(LegacyValue::Null, LegacyValue::Null);
    cursor.sort(&doc(vec![("_id", 1.into())])).unwrap();

    let first = cursor.current().await.unwrap();
    cursor.next().await.unwrap();
    cursor.next().await.unwrap();
    assert_ne!(cursor.current().await.unwrap(), first);

    cursor.rewind().await.unwrap();
    assert_eq!(cursor.current().await.unwrap(), first);
    assert_eq!(cursor.key().await.unwrap(), Some(LegacyValue::Int(1)));
}

#[tokio::test]
async fn iteration_reaches_the_end_and_dies() {
    let store = seeded().await;
    let mut cursor = store
        .collection("app", "users")
        .find(doc(vec![("age", doc(vec![("$lt", 40.into())]))]), LegacyValue::Null);
    cursor.sort(&doc(vec![("age", 1.into())])).unwrap();

    assert!(!cursor.dead());
    assert!(cursor.has_next().await.unwrap());

    let first = cursor.get_next().await.unwrap().unwrap();
    assert_eq!(first.member("name").unwrap().as_str(), Some("linus"));
    assert!(cursor.has_next().await.unwrap());

    let second = cursor.get_next().await.unwrap().unwrap();
    assert_eq!(second.member("name").unwrap().as_str(), Some("ada"));
    assert!(!cursor.has_next().await.unwrap());

    assert_eq!(cursor.get_next().await.unwrap(), None);
    assert!(!cursor.valid().await.unwrap());
    assert!(cursor.dead());
}

#[tokio::test]
async fn info_reports_the_iteration_position() {
    let store = seeded().await;
    let mut cursor = store.collection("app", "users").find(LegacyValue::Null, LegacyValue::Null);
    cursor.batch_size(2).unwrap();

    let building = cursor.info().unwrap();
    assert_eq!(building.ns, "app.users");
    assert!(!building.started_iterating);
    assert!(building.iteration.is_none());

    cursor.current().await.unwrap();
    cursor.next().await.unwrap();

    let info = cursor.info().unwrap();
    assert!(info.started_iterating);
    assert_eq!(info.batch_size, 2);

    let iteration = info.iteration.unwrap();
    assert_eq!(iteration.at, 1);
    assert_eq!(iteration.server.as_deref(), Some("localhost:27017"));
    assert_eq!(iteration.connection_type_desc, Some("STANDALONE"));

    let legacy = cursor.info().unwrap().to_legacy();
    assert_eq!(legacy.member("numReturned").and_then(|n| n.as_i64()), Some(2));
}

// ── Counting ────────────────────────────────────────────────────────────

#[tokio::test]
async fn count_honors_paging_only_when_asked() {
    let store = seeded().await;
    let users = store.collection("app", "users");

    let mut cursor = users.find(LegacyValue::Null, LegacyValue::Null);
    cursor.skip(1).unwrap().limit(2).unwrap();

    assert_eq!(cursor.count(false).await.unwrap(), 4);
    assert_eq!(cursor.count(true).await.unwrap(), 2);
    assert!(!cursor.is_open());

    cursor.current().await.unwrap();
    assert_eq!(cursor.count(true).await.unwrap(), 2);
    assert_eq!(cursor.to_vec().await.unwrap().len(), 2);

    assert_eq!(users.count(doc(vec![("name", "ada".into())])).await.unwrap(), 1);
}

// ── Single documents ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    #[serde(rename = "_id")]
    id: i64,
    name: String,
    age: i64,
}

#[tokio::test]
async fn find_one_returns_the_first_match() {
    let store = seeded().await;
    let users = store.collection("app", "users");

    let found = users
        .find_one(doc(vec![("name", "ken".into())]), LegacyValue::list(["age".into()]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.member("age").and_then(|a| a.as_i64()), Some(52));
    assert!(found.member("name").is_none());

    let typed: Option<User> = users.find_one_as(doc(vec![("_id", 2.into())])).await.unwrap();
    assert_eq!(
        typed,
        Some(User {
            id: 2,
            name: "grace".into(),
            age: 45,
        })
    );

    let missing: Option<User> = users.find_one_as(doc(vec![("_id", 99.into())])).await.unwrap();
    assert_eq!(missing, None);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Account {
    name: String,
    meta: BTreeMap<String, String>,
}

#[tokio::test]
async fn find_one_as_reads_empty_embedded_maps() {
    let store = BridgeStore::new(InMemoryStore::new());
    let accounts = store.collection("app", "accounts");

    let mut batch = accounts.batch(BatchKind::Insert);
    batch
        .add(&doc(vec![
            ("_id", 1_i64.into()),
            ("name", "ada".into()),
            ("meta", LegacyValue::Object(LegacyObject::new())),
        ]))
        .unwrap();
    batch.execute(&WriteOptions::default()).await.unwrap();

    let account: Option<Account> = accounts.find_one_as(doc(vec![("_id", 1_i64.into())])).await.unwrap();
    assert_eq!(
        account,
        Some(Account {
            name: "ada".into(),
            meta: BTreeMap::new(),
        })
    );
}

// ── Configuration ───────────────────────────────────────────────────────

#[tokio::test]
async fn store_defaults_seed_new_cursors() {
    let config = BridgeConfig::from_json_str(
        r#"{
            "read_preference": { "mode": "secondaryPreferred", "tag_sets": [{ "dc": "east" }] },
            "batch_size": 25
        }"#,
    )
    .unwrap();
    let store = BridgeStore::with_config(InMemoryStore::new(), config);

    let cursor = store.collection("app", "users").find(LegacyValue::Null, LegacyValue::Null);
    assert_eq!(cursor.read_preference().mode, ReadPreferenceMode::SecondaryPreferred);
    assert_eq!(cursor.read_preference().tag_sets.len(), 1);
    assert_eq!(cursor.info().unwrap().batch_size, 25);
}
