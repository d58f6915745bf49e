//! Inbox crate - GitHub notification sync engine
//!
//! This crate provides platform-independent notification functionality:
//! - Domain models (Notification, SyncCursor, Scope)
//! - GitHub notifications API client with conditional, paginated fetching
//! - Storage trait abstractions with in-memory and SQLite backends
//! - Idempotent reconciliation that preserves local-only state
//! - A cancellable polling scheduler that streams pages to subscribers
//! - Scope matching (glob rules, reasons, quiet hours)
//! - Query API and action handlers for UI consumption
//!
//! This crate has zero UI dependencies.

pub mod actions;
pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod query;
pub mod scope;
pub mod storage;
pub mod sync;

pub use actions::ActionHandler;
pub use config::{GitHubCredentials, Settings, load_scopes};
pub use error::{ApiError, SyncError};
pub use github::{
    FetchOptions, GitHubClient, NotificationPage, NotificationSource, RateLimit, Transport,
    UreqTransport, api::GitHubUser,
};
pub use models::{
    Notification, QuietHours, Reason, Repository, Scope, ScopeRule, Subject, SyncCursor, ThreadId,
};
pub use query::{InboxFilter, list_inbox, unread_count};
pub use scope::{CompiledScope, Delivery, is_in_quiet_hours, is_quiet_now, matches};
pub use storage::{CursorStore, InMemoryStore, NotificationStore, SqliteStore};
pub use sync::{
    // Reconciliation
    NotificationCache, PageStats,
    // Scheduling
    BackgroundRefreshResult, CredentialProvider, FetchOutcome, FetchStats, Poller, PollerConfig,
    PollerState, StaticToken, SyncEvent,
    // Timing (for UI cooldown management)
    cooldown_elapsed, next_poll_delay,
};
