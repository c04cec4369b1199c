pub mod error;
pub mod path;
pub mod projection;

pub use error::{DocError, Result};
pub use projection::Projection;

/// Field every persisted document carries as its identifier.
pub const ID_FIELD: &str = "_id";

/// Generates a fresh document identifier.
pub fn new_object_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
