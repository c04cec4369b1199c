#![allow(dead_code)]

use docmapper::{Connection, ConnectionConfig, MemoryStore, Model, Schema, types};
use std::sync::Arc;

pub fn connect() -> (Connection, Arc<MemoryStore>) {
    connect_with(ConnectionConfig::default())
}

pub fn connect_with(config: ConnectionConfig) -> (Connection, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let connection = Connection::new(store.clone(), config).expect("valid config");
    (connection, store)
}

/// `User { name, age, active, tags, posts <- Post.author }`
pub fn user_schema() -> Schema {
    Schema::builder("User")
        .field("name", types::string().default_value(""))
        .number("age")
        .boolean("active")
        .array("tags")
        .dbreffed_array("posts", "Post", "author")
        .build()
}

/// `Post { title, author -> User, readers -> [User] }`
pub fn post_schema() -> Schema {
    Schema::builder("Post")
        .string("title")
        .dbref("author", "User")
        .dbref_array("readers", "User")
        .build()
}

pub fn blog() -> (Connection, Arc<MemoryStore>, Model, Model) {
    let (connection, store) = connect();
    let users = connection.register(user_schema()).expect("register user");
    let posts = connection.register(post_schema()).expect("register post");
    (connection, store, users, posts)
}
