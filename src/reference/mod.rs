//! Lazy references between documents.
//!
//! - [`DbRef`]: single pointer with a cached live document
//! - [`DbRefArray`]: pointer collection resolved in one batched lookup
//! - [`DbReffedArray`]: paginated inverse collection queried by back-reference

mod dbref;
mod dbref_array;
mod dbreffed_array;
mod eventual;

pub use dbref::{DbRef, DbRefPointer};
pub use dbref_array::DbRefArray;
pub use dbreffed_array::{DbReffedArray, Page};
pub use eventual::{Derived, Eventual, FetchPhase, Resolver, Sequence};
