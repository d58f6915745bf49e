//! Reconciliation of fetched pages into the local notification cache

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::github::NotificationPage;
use crate::models::{Notification, SyncCursor, ThreadId};
use crate::storage::{CursorStore, NotificationStore};

/// Statistics from reconciling one page
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    /// Threads seen for the first time
    pub inserted: usize,
    /// Existing threads whose remote fields changed
    pub updated: usize,
    /// Existing threads identical to the stored record
    pub unchanged: usize,
    /// Repeated thread ids within the page that were skipped
    pub duplicates: usize,
}

impl PageStats {
    /// Number of records written
    pub fn changed(&self) -> usize {
        self.inserted + self.updated
    }

    pub(crate) fn add(&mut self, other: PageStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.duplicates += other.duplicates;
    }
}

/// The local notification cache and its cursor
///
/// Every write (page upserts, cursor saves and local user mutations) goes
/// through one write gate, so an on-demand refresh, a continuous poll and a
/// user action never interleave on the same thread id.
pub struct NotificationCache {
    notifications: Arc<dyn NotificationStore>,
    cursors: Arc<dyn CursorStore>,
    write_gate: Mutex<()>,
}

impl NotificationCache {
    pub fn new(notifications: Arc<dyn NotificationStore>, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            notifications,
            cursors,
            write_gate: Mutex::new(()),
        }
    }

    /// Build a cache over a store that persists both notifications and cursors
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: NotificationStore + CursorStore + 'static,
    {
        Self::new(store.clone(), store)
    }

    /// Read access to the notification store (queries never take the gate)
    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.notifications
    }

    fn gate(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_gate
            .lock()
            .map_err(|_| anyhow!("cache write gate poisoned"))
    }

    /// Load the persisted cursor for an account
    pub fn load_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        self.cursors.get_sync_cursor(account_id)
    }

    /// Persist one fetched page and, for a modified first page, the new cursor
    ///
    /// A not-modified page performs no write at all. The cursor is saved
    /// only after the page's records are committed, so a crash in between
    /// costs a refetch rather than lost notifications.
    pub fn apply_page(&self, account_id: &str, page: &NotificationPage) -> Result<PageStats> {
        if page.not_modified {
            debug!("[SYNC] {}: not modified, nothing to reconcile", account_id);
            return Ok(PageStats::default());
        }

        let _gate = self.gate()?;
        let stats = self.reconcile_locked(account_id, &page.notifications)?;

        if page.is_first {
            let cursor = self
                .cursors
                .get_sync_cursor(account_id)?
                .unwrap_or_else(|| SyncCursor::new(account_id, None))
                .advanced(page.cache.etag.clone(), page.cache.poll_interval_secs);
            debug!(
                "[SYNC] {}: cursor advanced to {:?} (poll interval {}s)",
                account_id, cursor.token, cursor.poll_interval_secs
            );
            self.cursors
                .save_sync_cursor(cursor)
                .context("Failed to save sync cursor")?;
        }

        Ok(stats)
    }

    /// Upsert a batch of remote records without touching the cursor
    pub fn reconcile(&self, account_id: &str, incoming: &[Notification]) -> Result<PageStats> {
        let _gate = self.gate()?;
        self.reconcile_locked(account_id, incoming)
    }

    fn reconcile_locked(&self, account_id: &str, incoming: &[Notification]) -> Result<PageStats> {
        let now = Utc::now();
        let mut stats = PageStats::default();
        let mut seen: HashSet<&ThreadId> = HashSet::with_capacity(incoming.len());
        let mut batch = Vec::new();

        for remote in incoming {
            if !seen.insert(&remote.id) {
                stats.duplicates += 1;
                continue;
            }

            match self.notifications.get_notification(account_id, &remote.id)? {
                None => {
                    let mut fresh = remote.clone();
                    fresh.reset_local_state();
                    fresh.last_fetched_at = now;
                    batch.push(fresh);
                    stats.inserted += 1;
                }
                Some(mut existing) => {
                    if merge_remote(&mut existing, remote) {
                        existing.last_fetched_at = now;
                        batch.push(existing);
                        stats.updated += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
            }
        }

        if stats.duplicates > 0 {
            debug!(
                "[SYNC] {}: skipped {} duplicate thread ids in page",
                account_id, stats.duplicates
            );
        }

        if !batch.is_empty() {
            self.notifications
                .save_notifications(account_id, &batch)
                .with_context(|| format!("Failed to persist {} notifications", batch.len()))?;
        }

        Ok(stats)
    }

    /// Drop the revalidation token so the next poll refetches everything
    ///
    /// Used when a fetch fails after its first page advanced the cursor:
    /// a 304 against that token would hide the pages never stored.
    pub fn invalidate_cursor_token(&self, account_id: &str) -> Result<()> {
        let _gate = self.gate()?;
        if let Some(mut cursor) = self.cursors.get_sync_cursor(account_id)?
            && cursor.token.is_some()
        {
            info!("[SYNC] {}: invalidating cursor after partial fetch", account_id);
            cursor.token = None;
            self.cursors.save_sync_cursor(cursor)?;
        }
        Ok(())
    }

    /// Mark a thread read locally
    ///
    /// Stamps the read fence, so stale remote pages cannot flip it back.
    /// Returns false if the thread is not cached.
    pub fn mark_read(&self, account_id: &str, id: &ThreadId) -> Result<bool> {
        let now = Utc::now();
        self.update_one(account_id, id, |n| {
            n.unread = false;
            n.read_locally_at = Some(now);
        })
    }

    /// Mark every unread thread read, optionally only those updated at or before `before`
    ///
    /// Returns the number of threads changed.
    pub fn mark_all_read(&self, account_id: &str, before: Option<DateTime<Utc>>) -> Result<usize> {
        let _gate = self.gate()?;
        let now = Utc::now();
        let batch: Vec<Notification> = self
            .notifications
            .list_notifications(account_id)?
            .into_iter()
            .filter(|n| n.unread && before.is_none_or(|cutoff| n.updated_at <= cutoff))
            .map(|mut n| {
                n.unread = false;
                n.read_locally_at = Some(now);
                n
            })
            .collect();

        if !batch.is_empty() {
            self.notifications.save_notifications(account_id, &batch)?;
        }
        info!("[SYNC] {}: marked {} threads read", account_id, batch.len());
        Ok(batch.len())
    }

    pub fn archive(&self, account_id: &str, id: &ThreadId) -> Result<bool> {
        self.update_one(account_id, id, |n| n.archived = true)
    }

    pub fn unarchive(&self, account_id: &str, id: &ThreadId) -> Result<bool> {
        self.update_one(account_id, id, |n| n.archived = false)
    }

    /// Snooze a thread; `None` snoozes until explicitly woken
    pub fn snooze(&self, account_id: &str, id: &ThreadId, until: Option<DateTime<Utc>>) -> Result<bool> {
        self.update_one(account_id, id, |n| {
            n.snoozed = true;
            n.snooze_until = until;
        })
    }

    pub fn unsnooze(&self, account_id: &str, id: &ThreadId) -> Result<bool> {
        self.update_one(account_id, id, |n| {
            n.snoozed = false;
            n.snooze_until = None;
        })
    }

    /// Clear snoozes whose deadline has passed; returns how many woke up
    pub fn wake_expired_snoozes(&self, account_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let _gate = self.gate()?;
        let batch: Vec<Notification> = self
            .notifications
            .list_notifications(account_id)?
            .into_iter()
            .filter(|n| n.snoozed && n.snooze_until.is_some_and(|until| until <= now))
            .map(|mut n| {
                n.snoozed = false;
                n.snooze_until = None;
                n
            })
            .collect();

        if !batch.is_empty() {
            self.notifications.save_notifications(account_id, &batch)?;
            debug!("[SYNC] {}: woke {} snoozed threads", account_id, batch.len());
        }
        Ok(batch.len())
    }

    fn update_one(
        &self,
        account_id: &str,
        id: &ThreadId,
        apply: impl FnOnce(&mut Notification),
    ) -> Result<bool> {
        let _gate = self.gate()?;
        let Some(mut notification) = self.notifications.get_notification(account_id, id)? else {
            debug!("[SYNC] {}: thread {} not cached", account_id, id);
            return Ok(false);
        };
        apply(&mut notification);
        self.notifications
            .save_notifications(account_id, std::slice::from_ref(&notification))?;
        Ok(true)
    }
}

/// Copy `value` into `slot` if it differs
fn update_field<T: PartialEq + Clone>(slot: &mut T, value: &T) -> bool {
    if slot != value {
        *slot = value.clone();
        true
    } else {
        false
    }
}

/// Merge the remote-owned fields of `remote` into `existing`
///
/// Local-only fields are never read from `remote`. Returns whether anything
/// changed.
fn merge_remote(existing: &mut Notification, remote: &Notification) -> bool {
    let mut changed = false;

    let mut unread = remote.unread;
    if let Some(read_at) = existing.read_locally_at {
        if remote.unread && remote.updated_at <= read_at {
            // Remote has not caught up with the local read yet
            unread = false;
        } else {
            existing.read_locally_at = None;
            changed = true;
        }
    }

    changed |= update_field(&mut existing.unread, &unread);
    changed |= update_field(&mut existing.updated_at, &remote.updated_at);
    changed |= update_field(&mut existing.last_read_at, &remote.last_read_at);
    changed |= update_field(&mut existing.reason, &remote.reason);
    changed |= update_field(&mut existing.subject, &remote.subject);
    changed |= update_field(&mut existing.repository, &remote.repository);
    changed
}
