//! Storage traits and implementations
//!
//! The reconciliation engine only talks to the traits, so the cache can be
//! backed by SQLite in the app and by plain maps in tests.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CursorStore, NotificationStore};
