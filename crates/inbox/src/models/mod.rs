//! Domain models for notification entities

mod notification;
mod scope;
mod sync_cursor;

pub use notification::{Notification, NotificationBuilder, Reason, Repository, Subject, ThreadId};
pub use scope::{QuietHours, Scope, ScopeRule};
pub use sync_cursor::{DEFAULT_POLL_INTERVAL_SECS, SyncCursor};
