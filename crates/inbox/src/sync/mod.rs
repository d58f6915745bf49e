//! Sync engine for polling and caching notifications
//!
//! Reconciliation is idempotent: applying the same page twice leaves the
//! cache as applying it once.

mod credentials;
mod poller;
mod reconcile;
mod timing;

pub use credentials::{CredentialProvider, StaticToken};
pub use poller::{
    BackgroundRefreshResult, DEFAULT_EVENT_CAPACITY, FetchOutcome, FetchStats, Poller,
    PollerConfig, PollerState, SyncEvent,
};
pub use reconcile::{NotificationCache, PageStats};
pub use timing::{MIN_POLL_DELAY, cooldown_elapsed, next_poll_delay};
