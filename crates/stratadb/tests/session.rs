//! End-to-end engine properties, driven through the public facade against
//! the recording stub driver.

use serde_json::json;
use std::{sync::Arc, time::Duration};
use stratadb::{
    core::{
        query::compile::NativeOp,
        testing::{RecordingDriver, ScriptedResponse},
        value::WireRow,
    },
    prelude::*,
};
use time::macros::datetime;

struct User;

impl Model for User {
    fn declare() -> SchemaBuilder {
        Schema::builder("User", BackendKind::Graph)
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int().min(0.0))
            .field("joined", FieldDef::datetime())
    }
}

struct Account;

impl Model for Account {
    fn declare() -> SchemaBuilder {
        Schema::builder("Account", BackendKind::KeyValue)
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int().min(0.0))
    }
}

fn graph_session() -> (Session, Arc<RecordingDriver>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let driver = RecordingDriver::new();
    registry.register("main", BackendKind::Graph, driver.clone(), true);

    (Session::new(registry), driver)
}

fn kv_session() -> (Session, Arc<RecordingDriver>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let driver = RecordingDriver::new();
    registry.register("cache", BackendKind::KeyValue, driver.clone(), true);

    (Session::new(registry), driver)
}

fn row(value: serde_json::Value) -> WireRow {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[tokio::test]
async fn save_then_fetch_returns_an_equal_document() {
    let (session, driver) = graph_session();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();
    user.set("age", 30).unwrap();
    user.set("joined", Value::DateTime(datetime!(2024-06-01 12:30:45.123 UTC)))
        .unwrap();

    session.save(&mut user).await.unwrap();

    let id = user.id().cloned().expect("identity after acknowledgement");
    assert!(user.dirty().is_empty());

    driver.push(ScriptedResponse::rows(vec![row(json!({
        "id": id.key(),
        "name": "Ada",
        "age": 30,
        "joined": "2024-06-01T12:30:45.123Z",
    }))]));

    let fetched = session
        .fetch::<User>(&id)
        .await
        .unwrap()
        .expect("row exists");

    assert_eq!(fetched, user);
}

#[tokio::test]
async fn partial_updates_send_only_dirty_fields() {
    let (session, driver) = graph_session();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();
    user.set("age", 30).unwrap();
    session.save(&mut user).await.unwrap();

    user.set("age", 31).unwrap();
    assert_eq!(user.dirty().len(), 1);
    session.save(&mut user).await.unwrap();

    let ops = driver.recorded();
    let NativeOp::Statement(update) = ops.last().unwrap() else {
        panic!("expected a statement");
    };
    assert!(update.starts_with("UPDATE user:"));
    assert!(update.contains("{\"age\":31}"));
    assert!(!update.contains("name"));
    assert!(user.dirty().is_empty());
}

#[tokio::test]
async fn a_clean_document_saves_without_touching_the_backend() {
    let (session, driver) = graph_session();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();
    session.save(&mut user).await.unwrap();

    let before = driver.request_count();
    session.save(&mut user).await.unwrap();
    assert_eq!(driver.request_count(), before);
}

#[tokio::test]
async fn a_cancelled_insert_assigns_no_identity() {
    let (session, driver) = graph_session();
    driver.never_acknowledge();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();

    {
        let save = session.save(&mut user);
        tokio::select! {
            _ = save => panic!("the driver never acknowledges"),
            () = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
    }

    assert!(user.id().is_none());
    // the insert was issued once and nothing followed it
    assert_eq!(driver.request_count(), 1);
}

#[tokio::test]
async fn deleting_clears_the_identity() {
    let (session, _driver) = graph_session();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();
    session.save(&mut user).await.unwrap();
    assert!(user.is_persisted());

    session.delete(&mut user).await.unwrap();
    assert!(user.id().is_none());
}

#[tokio::test]
async fn key_value_saves_yield_identities_and_range_filters_are_refused() {
    let (session, driver) = kv_session();

    let mut account = session.document::<Account>().unwrap();
    account.set("name", "Ada").unwrap();
    account.set("age", 30).unwrap();
    session.save(&mut account).await.unwrap();

    let id = account.id().cloned().expect("identity after acknowledgement");

    // the declared capability set refuses range operators deterministically
    let err = session
        .query::<Account>()
        .unwrap()
        .filter(predicate::gte("age", 18))
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
    assert!(err.to_string().contains("gte"));

    // point access by key stays available
    driver.push(ScriptedResponse::rows(vec![row(json!({
        "id": id.key(),
        "name": "Ada",
        "age": 30,
    }))]));
    let fetched = session
        .fetch::<Account>(&id)
        .await
        .unwrap()
        .expect("row exists");
    assert_eq!(fetched.get("name"), Some(&Value::from("Ada")));

    let conn = session.registry().resolve_kind(BackendKind::KeyValue).unwrap();
    assert!(conn.backend().supports(Capability::Ttl));
    assert!(conn.backend().supports(Capability::PartialUpdate));
    assert!(!conn.backend().supports(Capability::GraphRelations));
}

#[tokio::test]
async fn queries_stream_lazily_and_collect() {
    let (session, driver) = graph_session();

    driver.push(ScriptedResponse::rows(vec![
        row(json!({"id": "01ARZ3NDEKTSV4RRFFQ69G5FAV", "name": "Ada", "age": 30})),
        row(json!({"id": "01BX5ZZKBKACTAV9WEVGEMMVRY", "name": "Eva", "age": 22})),
    ]));

    let users = session
        .query::<User>()
        .unwrap()
        .filter(predicate::gte("age", 18))
        .order_by("name")
        .all()
        .await
        .unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].get("name"), Some(&Value::from("Ada")));
    assert!(users.iter().all(Document::is_persisted));
}

#[tokio::test]
async fn counts_return_the_backend_scalar() {
    let (session, driver) = graph_session();

    driver.push(ScriptedResponse::rows(vec![row(json!({"count": 7}))]));

    let count = session
        .query::<User>()
        .unwrap()
        .filter(predicate::gt("age", 18))
        .count()
        .await
        .unwrap();
    assert_eq!(count, 7);
}

#[tokio::test]
async fn refresh_rereads_persisted_state() {
    let (session, driver) = graph_session();

    let mut user = session.document::<User>().unwrap();
    user.set("name", "Ada").unwrap();
    session.save(&mut user).await.unwrap();
    let id = user.id().cloned().unwrap();

    driver.push(ScriptedResponse::rows(vec![row(json!({
        "id": id.key(),
        "name": "Renamed",
    }))]));

    assert!(session.refresh(&mut user).await.unwrap());
    assert_eq!(user.get("name"), Some(&Value::from("Renamed")));

    // a vanished row leaves the document untouched
    driver.push(ScriptedResponse::rows(Vec::new()));
    assert!(!session.refresh(&mut user).await.unwrap());
    assert_eq!(user.get("name"), Some(&Value::from("Renamed")));
}
