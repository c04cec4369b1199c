mod common;

use async_trait::async_trait;
use common::{blog, post_schema, user_schema};
use docmapper::{
    Connection, ConnectionConfig, DbRefPointer, DocError, Document, DocumentStore, FetchPhase,
    FindQuery, MemoryStore, Model, Result, Sequence, UpdateDescription, WriteOptions,
};
use docmapper::store::IndexInformation;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Delegates to a [`MemoryStore`] but suspends once before every find.
struct YieldingStore(MemoryStore);

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn insert(&self, collection: &str, doc: &Value, options: WriteOptions) -> Result<()> {
        self.0.insert(collection, doc, options).await
    }

    async fn update(
        &self,
        collection: &str,
        selector: &Value,
        update: &UpdateDescription,
        options: WriteOptions,
    ) -> Result<u64> {
        self.0.update(collection, selector, update, options).await
    }

    async fn remove(&self, collection: &str, selector: &Value) -> Result<u64> {
        self.0.remove(collection, selector).await
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>> {
        tokio::task::yield_now().await;
        self.0.find(collection, query).await
    }

    async fn count(&self, collection: &str, selector: &Value) -> Result<u64> {
        self.0.count(collection, selector).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.0.drop_collection(collection).await
    }

    async fn index_information(&self, collection: &str) -> Result<IndexInformation> {
        self.0.index_information(collection).await
    }
}

async fn users_named(users: &Model, names: &[&str]) -> Vec<Document> {
    let mut created = Vec::new();
    for name in names {
        created.push(users.create(json!({ "name": name })).await.unwrap());
    }
    created
}

fn pointers(docs: &[Document]) -> Value {
    Value::Array(docs.iter().map(|d| d.pointer().unwrap().to_value()).collect())
}

#[tokio::test]
async fn assigning_an_object_saves_the_referenced_document_first() {
    let (_connection, store, _users, posts) = blog();

    let mut post = posts
        .new_document(json!({"title": "t", "author": {"name": "ada"}}))
        .await
        .unwrap();
    assert_ok!(post.save().await);

    assert_eq!(store.stats().inserts(), 2);
    let authors = store.records("user").await;
    assert_eq!(authors.len(), 1);
    let stored = store.records("post").await;
    assert_eq!(
        stored[0]["author"],
        json!({"$ref": "user", "$id": authors[0]["_id"]})
    );

    let author = post.dbref("author").unwrap().resolve().await.unwrap().unwrap();
    assert_eq!(author.get("name"), json!("ada"));
    assert_eq!(store.stats().finds(), 0);
}

#[tokio::test]
async fn references_resolve_once_and_stay_cached() {
    let (_connection, store, users, posts) = blog();
    let ada = users_named(&users, &["ada"]).await.remove(0);
    let created = posts
        .create(json!({"title": "t", "author": ada.pointer().unwrap().to_value()}))
        .await
        .unwrap();

    let mut post = posts.find_by_id(&created.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(store.stats().finds(), 1);

    let mut author = post.dbref("author").unwrap();
    assert_eq!(author.pointer().unwrap(), Some(ada.pointer().unwrap()));
    let first = author.resolve().await.unwrap().unwrap();
    let again = author.resolve().await.unwrap().unwrap();

    assert_eq!(first.id(), ada.id());
    assert_eq!(again.get("name"), json!("ada"));
    assert_eq!(store.stats().finds(), 2);
}

#[tokio::test]
async fn dangling_references_are_integrity_errors() {
    let (_connection, _store, _users, posts) = blog();
    let mut post = posts
        .hydrate_document(
            json!({"_id": "p1", "author": {"$ref": "user", "$id": "ghost"}}),
            None,
        )
        .await
        .unwrap();

    let err = assert_err!(post.dbref("author").unwrap().resolve().await);
    assert!(matches!(err, DocError::ReferenceIntegrity(_)));
}

#[tokio::test]
async fn removing_a_reference_cascades_and_unsets_the_pointer() {
    let (_connection, store, users, posts) = blog();
    let ada = users_named(&users, &["ada"]).await.remove(0);
    let mut post = posts
        .create(json!({"title": "t", "author": ada.pointer().unwrap().to_value()}))
        .await
        .unwrap();

    assert_ok!(post.dbref("author").unwrap().remove().await);
    assert!(post.is_dirty("author"));
    assert!(store.records("user").await.is_empty());

    assert_eq!(post.clone().delta().update.to_value(), json!({"$unset": {"author": 1}}));
    assert_ok!(post.save().await);
    let stored = store.records("post").await;
    assert!(stored[0].get("author").is_none());
}

#[tokio::test]
async fn a_failed_cascade_keeps_the_reference_cached() {
    let (_connection, store, users, posts) = blog();
    let ada = users_named(&users, &["ada"]).await.remove(0);
    let mut post = posts
        .create(json!({"title": "t", "author": ada.pointer().unwrap().to_value()}))
        .await
        .unwrap();
    assert_ok!(post.dbref("author").unwrap().resolve().await);

    store.set_read_only(true);
    let err = assert_err!(post.dbref("author").unwrap().remove().await);
    assert!(matches!(err, DocError::Store(_)));
    assert!(!post.is_dirty("author"));

    let finds = store.stats().finds();
    let author = post.dbref("author").unwrap().resolve().await.unwrap().unwrap();
    assert_eq!(author.get("name"), json!("ada"));
    assert_eq!(store.stats().finds(), finds);
}

#[tokio::test]
async fn concurrent_resolutions_share_one_lookup() {
    let (_connection, store, users, posts) = blog();
    let readers = users_named(&users, &["ada", "grace", "edsger"]).await;
    let mut post = posts
        .hydrate_document(json!({"_id": "p1", "readers": pointers(&readers)}), None)
        .await
        .unwrap();
    let finds_before = store.stats().finds();

    let handle = post.dbref_array("readers").unwrap();
    assert_eq!(handle.len(), 3);
    assert_eq!(handle.phase().unwrap(), FetchPhase::Unfetched);

    let (left, right) = (handle.clone(), handle.clone());
    let (a, b) = tokio::join!(left.all(), right.all());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(store.stats().finds() - finds_before, 1);
    assert_eq!(a.len(), 3);
    assert_eq!(
        b.iter().map(|d| d.get("name")).collect::<Vec<_>>(),
        vec![json!("ada"), json!("grace"), json!("edsger")]
    );
    assert_eq!(handle.phase().unwrap(), FetchPhase::Fetched);

    assert_ok!(handle.all().await);
    assert_eq!(store.stats().finds() - finds_before, 1);
}

#[tokio::test]
async fn repeated_pointers_are_fetched_once_and_kept_in_order() {
    let (_connection, store, users, posts) = blog();
    let people = users_named(&users, &["ada", "grace"]).await;
    let repeated = vec![people[1].clone(), people[0].clone(), people[1].clone()];
    let mut post = posts
        .hydrate_document(json!({"_id": "p1", "readers": pointers(&repeated)}), None)
        .await
        .unwrap();
    let finds_before = store.stats().finds();

    let members = post.dbref_array("readers").unwrap().all().await.unwrap();
    let names: Vec<Value> = members.iter().map(|d| d.get("name")).collect();

    assert_eq!(names, vec![json!("grace"), json!("ada"), json!("grace")]);
    assert_eq!(store.stats().finds() - finds_before, 1);
}

#[tokio::test]
async fn single_members_and_combinators() {
    let (_connection, _store, users, posts) = blog();
    let people = users_named(&users, &["ada", "grace", "edsger"]).await;
    let mut post = posts
        .hydrate_document(json!({"_id": "p1", "readers": pointers(&people)}), None)
        .await
        .unwrap();
    let readers = post.dbref_array("readers").unwrap();

    let second = readers.at(1).await.unwrap().unwrap();
    assert_eq!(second.get("name"), json!("grace"));
    assert!(readers.at(7).await.unwrap().is_none());

    let tail = readers.slice(1, 3).all().await.unwrap();
    assert_eq!(tail.len(), 2);

    let long_names = readers
        .filter(|d: &Document| d.get("name").as_str().is_some_and(|n| n.len() > 3))
        .all()
        .await
        .unwrap();
    assert_eq!(long_names.len(), 2);

    let mut seen = Vec::new();
    readers
        .for_each(&mut |d: &Document, idx| seen.push((idx, d.get("name"))))
        .await
        .unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], (2, json!("edsger")));
}

#[tokio::test]
async fn pushed_references_are_persisted_with_the_owner() {
    let (_connection, store, users, posts) = blog();
    let ada = users_named(&users, &["ada"]).await.remove(0);
    let grace = users.new_document(json!({"name": "grace"})).await.unwrap();

    let mut post = posts.new_document(json!({"title": "t"})).await.unwrap();
    assert_ok!(post.push_ref("readers", ada.clone()));
    assert_ok!(post.push_ref("readers", grace.clone()));
    assert_ok!(post.save().await);

    assert_eq!(store.records("user").await.len(), 2);
    let stored = store.records("post").await;
    assert_eq!(
        stored[0]["readers"],
        json!([ada.pointer().unwrap().to_value(), grace.pointer().unwrap().to_value()])
    );

    let handle = post.dbref_array("readers").unwrap();
    assert!(handle.loaded().unwrap().iter().all(|d| !d.is_new()));

    assert_ok!(post.clear_refs("readers"));
    assert_ok!(post.save().await);
    assert_eq!(store.records("post").await[0]["readers"], json!([]));
}

#[tokio::test]
async fn inverse_references_query_by_back_reference() {
    let (_connection, store, users, posts) = blog();
    let ada = users_named(&users, &["ada"]).await.remove(0);
    let grace = users_named(&users, &["grace"]).await.remove(0);
    for (title, author) in [("a", &ada), ("b", &ada), ("c", &grace), ("d", &ada)] {
        posts
            .create(json!({"title": title, "author": author.pointer().unwrap().to_value()}))
            .await
            .unwrap();
    }

    let mut ada = users.find_by_id(&ada.id().unwrap()).await.unwrap().unwrap();
    let written = ada.dbreffed_array("posts").unwrap();
    assert_eq!(written.referred_as(), "author");

    let all = written.all().await.unwrap();
    let titles: Vec<Value> = all.iter().map(|p| p.get("title")).collect();
    assert_eq!(titles, vec![json!("a"), json!("b"), json!("d")]);

    let finds = store.stats().finds();
    assert_ok!(written.all().await);
    assert_eq!(store.stats().finds(), finds);

    let page = written.page(Some(1), Some(1)).unwrap().all().await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("title"), json!("b"));
    assert_eq!(store.stats().finds(), finds + 1);
}

#[tokio::test]
async fn paging_during_a_fetch_refetches_on_next_access() {
    let connection = Connection::new(
        Arc::new(YieldingStore(MemoryStore::new())),
        ConnectionConfig::default(),
    )
    .unwrap();
    let users = connection.register(user_schema()).unwrap();
    let posts = connection.register(post_schema()).unwrap();
    let ada = users.create(json!({"name": "ada"})).await.unwrap();
    for title in ["a", "b", "c"] {
        posts
            .create(json!({"title": title, "author": ada.pointer().unwrap().to_value()}))
            .await
            .unwrap();
    }

    let mut ada = users.find_by_id(&ada.id().unwrap()).await.unwrap().unwrap();
    let written = ada.dbreffed_array("posts").unwrap();

    let (first, _) = tokio::join!(written.all(), async {
        assert_eq!(written.phase().unwrap(), FetchPhase::Fetching);
        written.page(Some(1), None).unwrap();
    });
    assert_eq!(first.unwrap().len(), 3);
    assert_eq!(written.phase().unwrap(), FetchPhase::Unfetched);

    let page = written.all().await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("title"), json!("a"));
    assert_eq!(written.phase().unwrap(), FetchPhase::Fetched);
}

#[tokio::test]
async fn built_inverse_members_are_saved_with_the_owner() {
    let (_connection, store, users, _posts) = blog();
    let mut ada = users.create(json!({"name": "ada"})).await.unwrap();
    let written = ada.dbreffed_array("posts").unwrap();

    let draft = written.build(json!({"title": "draft"})).unwrap();
    assert!(draft.is_new());
    assert_eq!(draft.get("author"), ada.pointer().unwrap().to_value());
    assert!(store.records("post").await.is_empty());

    assert_ok!(ada.save().await);
    assert_eq!(store.records("post").await.len(), 1);

    let published = written.create(json!({"title": "live"})).await.unwrap();
    assert!(!published.is_new());
    assert_eq!(store.records("post").await.len(), 2);

    let titles: Vec<Value> = written
        .all()
        .await
        .unwrap()
        .iter()
        .map(|p| p.get("title"))
        .collect();
    assert_eq!(titles, vec![json!("draft"), json!("live")]);
}

#[tokio::test]
async fn inverse_members_can_be_assigned_in_bulk() {
    let (_connection, store, users, _posts) = blog();
    let mut ada = users
        .new_document(json!({"name": "ada", "posts": [{"title": "one"}, {"title": "two"}]}))
        .await
        .unwrap();
    assert!(ada.to_object().get("posts").is_none());

    assert_ok!(ada.save().await);
    let stored = store.records("post").await;
    assert_eq!(stored.len(), 2);
    let back = DbRefPointer::from_value(&stored[0]["author"]).unwrap();
    assert_eq!(Some(back.id), ada.id());
}
