//! In-memory storage implementation
//!
//! Used for tests and for running without a database file.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CursorStore, NotificationStore};
use crate::models::{Notification, SyncCursor, ThreadId};

type NotificationMap = HashMap<(String, ThreadId), Notification>;

/// In-memory implementation of NotificationStore and CursorStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryStore {
    notifications: RwLock<NotificationMap>,
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            notifications: RwLock::new(HashMap::new()),
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn read_notifications(&self) -> Result<RwLockReadGuard<'_, NotificationMap>> {
        self.notifications
            .read()
            .map_err(|_| anyhow!("notification map lock poisoned"))
    }

    fn write_notifications(&self) -> Result<RwLockWriteGuard<'_, NotificationMap>> {
        self.notifications
            .write()
            .map_err(|_| anyhow!("notification map lock poisoned"))
    }

    fn read_cursors(&self) -> Result<RwLockReadGuard<'_, HashMap<String, SyncCursor>>> {
        self.cursors
            .read()
            .map_err(|_| anyhow!("cursor map lock poisoned"))
    }

    fn write_cursors(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, SyncCursor>>> {
        self.cursors
            .write()
            .map_err(|_| anyhow!("cursor map lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore for InMemoryStore {
    fn get_notification(&self, account_id: &str, id: &ThreadId) -> Result<Option<Notification>> {
        let notifications = self.read_notifications()?;
        Ok(notifications
            .get(&(account_id.to_string(), id.clone()))
            .cloned())
    }

    fn save_notifications(&self, account_id: &str, batch: &[Notification]) -> Result<()> {
        // A single write guard makes the batch atomic for readers
        let mut notifications = self.write_notifications()?;
        for notification in batch {
            notifications.insert(
                (account_id.to_string(), notification.id.clone()),
                notification.clone(),
            );
        }
        Ok(())
    }

    fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>> {
        let notifications = self.read_notifications()?;
        let mut list: Vec<Notification> = notifications
            .iter()
            .filter(|((account, _), _)| account == account_id)
            .map(|(_, n)| n.clone())
            .collect();

        // Newest first, id as tie-breaker for a stable order
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    fn count_notifications(&self, account_id: &str) -> Result<usize> {
        let notifications = self.read_notifications()?;
        Ok(notifications
            .keys()
            .filter(|(account, _)| account == account_id)
            .count())
    }

    fn delete_account(&self, account_id: &str) -> Result<()> {
        self.write_notifications()?
            .retain(|(account, _), _| account != account_id);
        self.write_cursors()?.remove(account_id);
        Ok(())
    }
}

impl CursorStore for InMemoryStore {
    fn get_sync_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        Ok(self.read_cursors()?.get(account_id).cloned())
    }

    fn save_sync_cursor(&self, cursor: SyncCursor) -> Result<()> {
        self.write_cursors()?
            .insert(cursor.account_id.clone(), cursor);
        Ok(())
    }

    fn delete_sync_cursor(&self, account_id: &str) -> Result<()> {
        self.write_cursors()?.remove(account_id);
        Ok(())
    }
}
