// ============================================================================
// docmapper
// ============================================================================

//! Document mapper core.
//!
//! Documents are JSON value trees addressed by dotted paths. Every declared
//! path carries a descriptor from the [`types`] library that decides how
//! assignments are coerced, which validators gate a save and how a change is
//! encoded for the store. Persistence goes through named task pipelines with
//! pre and post hooks, and references between documents resolve lazily.
//!
//! ```no_run
//! use docmapper::{Connection, ConnectionConfig, MemoryStore, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> docmapper::Result<()> {
//! let connection = Connection::new(Arc::new(MemoryStore::new()), ConnectionConfig::default())?;
//! let users = connection.register(
//!     Schema::builder("User")
//!         .string("name")
//!         .array("tags")
//!         .build(),
//! )?;
//!
//! let mut user = users.create(json!({"name": "ada", "tags": ["math"]})).await?;
//! user.array_mut("tags")?.push("engines");
//! user.save().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod core;
pub mod document;
pub mod model;
pub mod reference;
pub mod schema;
pub mod store;
pub mod types;

pub use connection::{Connection, config::ConnectionConfig};
pub use core::{DocError, ID_FIELD, Projection, Result};
pub use document::{
    ArrayMut, ArrayOp, DirtyDelta, Document, EmbeddedArray, Hook, HookFlow, HookResult, Member,
    TaskAction, TaskFuture, TaskOverride, UpdateDescription,
};
pub use model::{Model, Query};
pub use reference::{
    DbRef, DbRefArray, DbRefPointer, DbReffedArray, Derived, Eventual, FetchPhase, Page,
    Resolver, Sequence,
};
pub use schema::{PathDescriptor, PathKind, Schema, SchemaBuilder, Subtype, Verdict};
pub use store::{DocumentStore, FindQuery, MemoryStore, StoreStats, WriteOptions};
