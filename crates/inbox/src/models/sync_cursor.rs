//! Sync cursor tracking for conditional notification polling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll interval used until the server advises one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Tracks polling progress for a GitHub account
///
/// Persisted separately from notifications so that a poll can revalidate
/// instead of refetching. Only one SyncCursor per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Account identifier
    pub account_id: String,
    /// Opaque revalidation token (ETag); `None` means fetch everything
    pub token: Option<String>,
    /// When the last successful poll completed
    pub last_poll_at: DateTime<Utc>,
    /// Server-advised minimum poll interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl SyncCursor {
    /// Create a cursor after a successful poll
    pub fn new(account_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            account_id: account_id.into(),
            token,
            last_poll_at: Utc::now(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }

    /// Set the server-advised poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Advance the cursor with the metadata of a fresh first page
    ///
    /// A missing poll-interval hint keeps the previously advised one.
    pub fn advanced(mut self, token: Option<String>, poll_interval_secs: Option<u64>) -> Self {
        self.token = token;
        self.last_poll_at = Utc::now();
        if let Some(secs) = poll_interval_secs {
            self.poll_interval_secs = secs;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
