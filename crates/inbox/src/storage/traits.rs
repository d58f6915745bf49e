//! Storage trait definitions

use crate::models::{Notification, SyncCursor, ThreadId};
use anyhow::Result;

/// Trait for notification cache storage
///
/// Records are keyed by (account, thread id). Implementations only need
/// point lookups, batch upserts and per-account scans.
pub trait NotificationStore: Send + Sync {
    /// Get a notification by thread ID
    fn get_notification(&self, account_id: &str, id: &ThreadId) -> Result<Option<Notification>>;

    /// Insert or replace a batch of notifications atomically
    ///
    /// Either every record in the batch is written or none is.
    fn save_notifications(&self, account_id: &str, batch: &[Notification]) -> Result<()>;

    /// List an account's notifications, ordered by updated_at descending
    fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>>;

    /// Count an account's notifications
    fn count_notifications(&self, account_id: &str) -> Result<usize>;

    /// Remove everything stored for an account (account removal)
    fn delete_account(&self, account_id: &str) -> Result<()>;
}

/// Trait for per-account sync cursor persistence
///
/// Pure key-value storage with no business logic.
pub trait CursorStore: Send + Sync {
    /// Get the sync cursor for an account
    fn get_sync_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>>;

    /// Save the sync cursor (upsert)
    fn save_sync_cursor(&self, cursor: SyncCursor) -> Result<()>;

    /// Delete the sync cursor for an account
    fn delete_sync_cursor(&self, account_id: &str) -> Result<()>;
}
