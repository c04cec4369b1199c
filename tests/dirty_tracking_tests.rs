mod common;

use common::{blog, connect};
use docmapper::{DocError, ID_FIELD, Schema, types};
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn new_document_delta_sets_defaults_and_appends_arrays() {
    let (_connection, _store, users, _posts) = blog();

    let mut user = users.new_document(json!({"tags": ["a", "b"]})).await.unwrap();
    let delta = user.delta();

    assert_eq!(delta.update.set.get("name"), Some(&json!("")));
    assert_eq!(delta.update.set.get("age"), Some(&json!(0)));
    assert_eq!(
        delta.update.push_all.get("tags"),
        Some(&vec![json!("a"), json!("b")])
    );
    assert!(!delta.update.set.contains_key("tags"));
    assert_eq!(delta.previous[ID_FIELD], json!(user.id()));
}

#[tokio::test]
async fn assigning_an_equal_value_is_not_a_change() {
    let (_connection, _store, users, _posts) = blog();
    let mut user = users
        .hydrate_document(json!({"_id": "u1", "name": "ada", "tags": ["x"]}), None)
        .await
        .unwrap();

    user.set("name", "ada").set("tags", json!(["x"]));
    assert!(!user.has_dirty());

    user.set("name", "grace");
    assert_eq!(user.dirty_paths(), vec!["name".to_string()]);
}

#[tokio::test]
async fn saving_twice_only_writes_once() {
    let (_connection, store, users, _posts) = blog();
    let mut user = users.create(json!({"name": "ada"})).await.unwrap();
    assert_eq!(store.stats().inserts(), 1);
    assert!(!user.is_new());
    assert!(!user.has_dirty());

    user.set("name", "grace");
    assert_ok!(user.save().await);
    assert_eq!(store.stats().updates(), 1);
    assert!(!user.has_dirty());

    assert_ok!(user.save().await);
    assert_eq!(store.stats().updates(), 1);
    assert_eq!(store.records("user").await[0]["name"], json!("grace"));
}

#[tokio::test]
async fn consecutive_pushes_encode_one_append() {
    let (_connection, _store, users, _posts) = blog();
    let mut user = users
        .hydrate_document(json!({"_id": "u1", "tags": []}), None)
        .await
        .unwrap();

    user.array_mut("tags").unwrap().push("x").push("y");
    let delta = user.delta();

    assert_eq!(delta.update.to_value(), json!({"$pushAll": {"tags": ["x", "y"]}}));
    assert_eq!(delta.previous, json!({"_id": "u1", "tags": []}));
}

#[tokio::test]
async fn single_removals_encode_a_pop() {
    let (_connection, _store, users, _posts) = blog();
    let mut user = users
        .hydrate_document(json!({"_id": "u1", "tags": ["a", "b", "c"]}), None)
        .await
        .unwrap();

    assert_eq!(user.array_mut("tags").unwrap().pop(), Some(json!("c")));
    assert_eq!(user.delta().update.to_value(), json!({"$pop": {"tags": 1}}));

    assert_eq!(user.array_mut("tags").unwrap().shift(), Some(json!("a")));
    assert_eq!(user.delta().update.to_value(), json!({"$pop": {"tags": -1}}));
}

#[tokio::test]
async fn push_then_pop_overwrites_the_array() {
    let (_connection, _store, users, _posts) = blog();
    let mut user = users
        .hydrate_document(json!({"_id": "u1", "tags": ["a", "b"]}), None)
        .await
        .unwrap();

    {
        let mut tags = user.array_mut("tags").unwrap();
        tags.push("c");
        tags.pop();
    }
    assert_eq!(
        user.delta().update.to_value(),
        json!({"$set": {"tags": ["a", "b"]}})
    );
}

#[tokio::test]
async fn reassigning_a_populated_array_overwrites_it() {
    let (_connection, _store, users, _posts) = blog();
    let mut user = users
        .hydrate_document(json!({"_id": "u1", "tags": ["a"]}), None)
        .await
        .unwrap();

    user.set("tags", json!(["b", "c"]));
    assert_eq!(
        user.delta().update.to_value(),
        json!({"$set": {"tags": ["b", "c"]}})
    );
}

#[tokio::test]
async fn appends_reach_the_store_atomically() {
    let (_connection, store, users, _posts) = blog();
    let mut user = users.create(json!({"name": "ada", "tags": ["a"]})).await.unwrap();

    user.array_mut("tags").unwrap().push("b");
    assert_ok!(user.save().await);
    assert_eq!(store.records("user").await[0]["tags"], json!(["a", "b"]));

    user.array_mut("tags").unwrap().shift();
    assert_ok!(user.save().await);
    assert_eq!(store.records("user").await[0]["tags"], json!(["b"]));
}

#[tokio::test]
async fn a_failed_update_falls_back_to_overwrite() {
    let (_connection, store, users, _posts) = blog();
    let mut user = users.create(json!({"tags": ["a"]})).await.unwrap();

    user.array_mut("tags").unwrap().push("b");
    store.set_read_only(true);
    let err = assert_err!(user.save().await);
    assert!(matches!(err, DocError::Store(_)));
    assert!(user.is_dirty("tags"));

    store.set_read_only(false);
    let delta = user.clone().delta();
    assert_eq!(delta.update.set.get("tags"), Some(&json!(["a", "b"])));

    assert_ok!(user.save().await);
    assert_eq!(store.records("user").await[0]["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn saving_a_stale_copy_reports_a_conflict() {
    let (_connection, store, users, _posts) = blog();
    let created = users.create(json!({"tags": ["a"]})).await.unwrap();
    let id = created.id().unwrap();

    let mut first = users.find_by_id(&id).await.unwrap().unwrap();
    let mut second = users.find_by_id(&id).await.unwrap().unwrap();

    first.array_mut("tags").unwrap().push("b");
    assert_ok!(first.save().await);

    second.array_mut("tags").unwrap().push("c");
    let err = assert_err!(second.save().await);
    assert!(matches!(err, DocError::Store(_)));
    assert!(second.is_dirty("tags"));
    assert_eq!(second.to_object()["tags"], json!(["a", "c"]));

    assert_eq!(store.records("user").await[0]["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn cleared_paths_are_written_as_null() {
    let (connection, store) = connect();
    let notes = connection
        .register(
            Schema::builder("Note")
                .string("body")
                .field("meta", types::raw())
                .build(),
        )
        .unwrap();

    let mut note = notes
        .create(json!({"body": "x", "meta": {"k": 1}}))
        .await
        .unwrap();
    note.set("meta", Value::Null).set("body", "y");
    assert_eq!(
        note.delta().update.to_value(),
        json!({"$set": {"body": "y", "meta": null}})
    );

    note.set("meta", json!({"k": 2}));
    assert_ok!(note.save().await);
    assert_eq!(store.records("note").await[0]["meta"], json!({"k": 2}));
}
