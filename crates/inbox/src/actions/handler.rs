//! Action handler for notification operations
//!
//! Coordinates between the GitHub API and the local cache for mutations.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::github::GitHubClient;
use crate::models::ThreadId;
use crate::sync::{CredentialProvider, NotificationCache};

/// Handler for user actions like read, archive and snooze
///
/// Actions that GitHub knows about are performed in two steps:
/// 1. Update the local cache (under the cache's write gate)
/// 2. Call the GitHub API
///
/// The local write comes first so it is ordered before any poll that
/// starts afterwards. If the API call fails the local state is kept; the
/// read fence stops stale pages from undoing it and the caller may retry.
/// Archive and snooze exist only locally.
pub struct ActionHandler {
    github: Arc<GitHubClient>,
    cache: Arc<NotificationCache>,
    credentials: Arc<dyn CredentialProvider>,
    account_id: String,
}

impl ActionHandler {
    pub fn new(
        github: Arc<GitHubClient>,
        cache: Arc<NotificationCache>,
        credentials: Arc<dyn CredentialProvider>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            github,
            cache,
            credentials,
            account_id: account_id.into(),
        }
    }

    fn token(&self) -> Result<String> {
        self.credentials
            .access_token(&self.account_id)
            .ok_or_else(|| anyhow!("No access token for account {}", self.account_id))
    }

    /// Mark a thread as read here and on GitHub
    pub fn mark_read(&self, thread_id: &ThreadId) -> Result<()> {
        if !self.cache.mark_read(&self.account_id, thread_id)? {
            warn!("Marking uncached thread {} read", thread_id);
        }

        let token = self.token()?;
        self.github
            .mark_thread_read(&token, thread_id)
            .with_context(|| format!("Failed to mark thread {} read on GitHub", thread_id))?;

        info!("Marked thread {} read", thread_id);
        Ok(())
    }

    /// Mark everything read, optionally only threads updated at or before `before`
    ///
    /// Returns the number of cached threads that changed.
    pub fn mark_all_read(&self, before: Option<DateTime<Utc>>) -> Result<usize> {
        let count = self.cache.mark_all_read(&self.account_id, before)?;

        let token = self.token()?;
        self.github
            .mark_all_read(&token, before)
            .context("Failed to mark all notifications read on GitHub")?;

        info!("Marked {} threads read", count);
        Ok(count)
    }

    /// Archive a thread (hide it from the inbox)
    pub fn archive(&self, thread_id: &ThreadId) -> Result<bool> {
        let found = self.cache.archive(&self.account_id, thread_id)?;
        if found {
            info!("Archived thread {}", thread_id);
        }
        Ok(found)
    }

    pub fn unarchive(&self, thread_id: &ThreadId) -> Result<bool> {
        self.cache.unarchive(&self.account_id, thread_id)
    }

    /// Hide a thread until `until`, or until unsnoozed when `None`
    pub fn snooze(&self, thread_id: &ThreadId, until: Option<DateTime<Utc>>) -> Result<bool> {
        let found = self.cache.snooze(&self.account_id, thread_id, until)?;
        if found {
            info!(
                "Snoozed thread {} until {}",
                thread_id,
                until.map_or_else(|| "woken".to_string(), |t| t.to_rfc3339())
            );
        }
        Ok(found)
    }

    pub fn unsnooze(&self, thread_id: &ThreadId) -> Result<bool> {
        self.cache.unsnooze(&self.account_id, thread_id)
    }

    /// Stop receiving notifications for a thread and archive it locally
    pub fn unsubscribe(&self, thread_id: &ThreadId) -> Result<()> {
        let token = self.token()?;
        self.github
            .unsubscribe_thread(&token, thread_id)
            .with_context(|| format!("Failed to unsubscribe from thread {}", thread_id))?;

        self.cache.archive(&self.account_id, thread_id)?;
        info!("Unsubscribed from thread {}", thread_id);
        Ok(())
    }
}
