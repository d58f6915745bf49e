//! Query API for UI consumption
//!
//! Read-only views over the cache; they never take the write gate.

mod inbox;

pub use inbox::{InboxFilter, list_inbox, list_inbox_at, unread_count};
