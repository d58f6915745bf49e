//! Polling scheduler
//!
//! Drives fetch cycles for one account, either continuously (fetch, sleep
//! for the server-advised interval, repeat) or once on demand. Every page
//! is persisted through the [`NotificationCache`] and then broadcast to
//! subscribers in the order the API returned it.
//!
//! The blocking page iterator runs on tokio's blocking pool. All scheduler
//! state lives in one `watch` channel, which is also what stop signals
//! travel on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;

use super::credentials::CredentialProvider;
use super::reconcile::{NotificationCache, PageStats};
use super::timing::{cooldown_elapsed, next_poll_delay};
use crate::error::SyncError;
use crate::github::{FetchOptions, NotificationPage, NotificationSource, RateLimit};
use crate::models::DEFAULT_POLL_INTERVAL_SECS;

/// Events buffered per subscriber before it starts missing them
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Scheduler settings for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub account_id: String,
    pub options: FetchOptions,
    /// Interval used until the server advises one
    pub default_interval_secs: u64,
    pub event_capacity: usize,
}

impl PollerConfig {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            options: FetchOptions::default(),
            default_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_default_interval(mut self, secs: u64) -> Self {
        self.default_interval_secs = secs;
        self
    }
}

/// Lifecycle of the continuous polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Sleeping,
    Stopped,
}

/// Totals for one fetch cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: usize,
    pub totals: PageStats,
    /// Rate limit counters of the last page received
    pub rate_limit: Option<RateLimit>,
}

/// How a fetch cycle ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The collection changed and every page was reconciled
    Fetched(FetchStats),
    /// 304: nothing changed since the stored cursor
    NotModified,
    /// No access token for the account; nothing was requested
    Skipped,
    /// The poller was stopped before the fetch finished
    Cancelled,
}

/// What subscribers receive
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A page was persisted
    Page {
        account_id: String,
        page: Arc<NotificationPage>,
        stats: PageStats,
    },
    /// A fetch cycle finished
    Completed {
        account_id: String,
        outcome: FetchOutcome,
    },
    /// A fetch cycle failed
    Failed {
        account_id: String,
        error: Arc<SyncError>,
    },
}

/// Result reported to the OS after a background refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundRefreshResult {
    NewData,
    NoData,
    Failed,
}

/// Value of the control channel
///
/// `run` identifies the current continuous loop. A loop (and any fetch it
/// started) is cancelled once the state is `Stopped` or a newer loop has
/// taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Control {
    state: PollerState,
    run: u64,
}

impl Control {
    fn is_cancelled(&self, run: u64) -> bool {
        self.run != run || self.state == PollerState::Stopped
    }
}

/// What a fetch cycle checks between pages to know it should give up
#[derive(Debug, Clone)]
enum Cancel {
    /// On-demand refresh: runs to completion
    Never,
    /// Tied to a continuous loop
    Run(u64),
    /// Tripped by whoever started the cycle, e.g. an expired deadline
    Flag(Arc<AtomicBool>),
}

struct Shared {
    source: Arc<dyn NotificationSource>,
    cache: Arc<NotificationCache>,
    credentials: Arc<dyn CredentialProvider>,
    config: PollerConfig,
    control: watch::Sender<Control>,
    events: broadcast::Sender<SyncEvent>,
}

/// Notification poller for a single account
pub struct Poller {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        source: Arc<dyn NotificationSource>,
        cache: Arc<NotificationCache>,
        credentials: Arc<dyn CredentialProvider>,
        config: PollerConfig,
    ) -> Self {
        let (control, _) = watch::channel(Control {
            state: PollerState::Idle,
            run: 0,
        });
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                source,
                cache,
                credentials,
                config,
                control,
                events,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.shared.config.account_id
    }

    pub fn state(&self) -> PollerState {
        self.shared.control.borrow().state
    }

    /// Receive every page and cycle result from now on
    ///
    /// A subscriber that falls more than the event capacity behind misses
    /// the oldest events instead of stalling the poller.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Start continuous polling, stopping any loop already running
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;

        if let Some(previous) = task.take() {
            self.stop();
            if let Err(e) = previous.await {
                warn!("[POLL] Previous polling loop ended abnormally: {}", e);
            }
        }

        let mut run = 0;
        self.shared.control.send_modify(|control| {
            control.run += 1;
            control.state = PollerState::Idle;
            run = control.run;
        });

        info!("[POLL] {}: starting continuous polling", self.account_id());
        *task = Some(tokio::spawn(run_loop(Arc::clone(&self.shared), run)));
    }

    /// Stop continuous polling
    ///
    /// Wakes a sleeping loop immediately. A fetch in flight may finish its
    /// current request, but none of its pages are persisted or forwarded
    /// afterwards.
    pub fn stop(&self) {
        let stopped = self.shared.control.send_if_modified(|control| {
            if control.state == PollerState::Stopped {
                false
            } else {
                control.state = PollerState::Stopped;
                true
            }
        });
        if stopped {
            info!("[POLL] {}: stopped", self.account_id());
        }
    }

    /// Stop and wait for the polling loop to exit
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("[POLL] Polling loop ended abnormally: {}", e);
        }
    }

    /// Run one fetch cycle now and report its terminal error, if any
    ///
    /// Independent of the continuous loop: it runs whether or not polling
    /// is started, and `stop` does not cancel it.
    pub async fn refresh_now(&self) -> Result<FetchOutcome, SyncError> {
        info!("[POLL] {}: on-demand refresh", self.account_id());
        self.shared.fetch_cycle(Cancel::Never).await
    }

    /// One bounded pass for an OS background-refresh window
    ///
    /// Respects the server-advised interval since the last poll and never
    /// returns an error: failures are logged and reported as
    /// [`BackgroundRefreshResult::Failed`].
    pub async fn background_refresh(&self, deadline: Duration) -> BackgroundRefreshResult {
        let account_id = self.account_id();

        match self.shared.cache.load_cursor(account_id) {
            Ok(Some(cursor)) if !cooldown_elapsed(Some(cursor.last_poll_at), cursor.poll_interval_secs) => {
                debug!("[POLL] {}: background refresh within poll interval, skipping", account_id);
                return BackgroundRefreshResult::NoData;
            }
            Ok(_) => {}
            Err(e) => {
                error!("[POLL] {}: failed to load cursor: {:#}", account_id, e);
                return BackgroundRefreshResult::Failed;
            }
        }

        let expired = Arc::new(AtomicBool::new(false));
        let cycle = self.shared.fetch_cycle(Cancel::Flag(Arc::clone(&expired)));

        match tokio::time::timeout(deadline, cycle).await {
            Ok(Ok(FetchOutcome::Fetched(stats))) if stats.totals.changed() > 0 => {
                BackgroundRefreshResult::NewData
            }
            Ok(Ok(_)) => BackgroundRefreshResult::NoData,
            Ok(Err(e)) => {
                warn!("[POLL] {}: background refresh failed: {}", account_id, e);
                BackgroundRefreshResult::Failed
            }
            Err(_) => {
                // The blocking worker outlives the timeout; keep it from
                // persisting or forwarding anything further
                expired.store(true, Ordering::SeqCst);
                warn!(
                    "[POLL] {}: background refresh exceeded {:?}",
                    account_id, deadline
                );
                BackgroundRefreshResult::Failed
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Continuous polling loop for one run
async fn run_loop(shared: Arc<Shared>, run: u64) {
    let account_id = shared.config.account_id.clone();
    let mut control = shared.control.subscribe();

    loop {
        if !shared.transition(run, PollerState::Fetching) {
            break;
        }

        let result = tokio::select! {
            result = shared.fetch_cycle(Cancel::Run(run)) => result,
            _ = cancelled(&mut control, run) => break,
        };

        // Only a rejected token ends the loop; anything else retries next tick
        let rate_limit_reset = match &result {
            Ok(FetchOutcome::Fetched(stats)) => stats
                .rate_limit
                .filter(RateLimit::is_exhausted)
                .map(|limit| limit.reset_at),
            Ok(_) => None,
            Err(e) if e.requires_reauthentication() => {
                // The same token will be rejected again; hold until `start` or `stop`
                error!(
                    "[POLL] {}: token rejected, polling paused until restarted",
                    account_id
                );
                if shared.transition(run, PollerState::Idle) {
                    cancelled(&mut control, run).await;
                }
                break;
            }
            Err(e) if e.is_transient() => {
                warn!("[POLL] {}: poll failed, retrying next tick: {}", account_id, e);
                e.rate_limit_reset()
            }
            Err(e) => {
                error!("[POLL] {}: poll failed, retrying next tick: {}", account_id, e);
                None
            }
        };

        let advised = match shared.cache.load_cursor(&account_id) {
            Ok(cursor) => cursor.map(|c| c.poll_interval_secs),
            Err(e) => {
                warn!("[POLL] {}: failed to load cursor: {:#}", account_id, e);
                None
            }
        };
        let delay = next_poll_delay(
            advised,
            rate_limit_reset,
            Utc::now(),
            shared.config.default_interval_secs,
        );

        if !shared.transition(run, PollerState::Sleeping) {
            break;
        }
        debug!("[POLL] {}: next poll in {:?}", account_id, delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancelled(&mut control, run) => break,
        }
    }

    debug!("[POLL] {}: polling loop {} exited", account_id, run);
}

/// Resolves once `run` is stopped or superseded
async fn cancelled(control: &mut watch::Receiver<Control>, run: u64) {
    // The sender lives in `Shared`, which outlives every loop
    let _ = control.wait_for(|c| c.is_cancelled(run)).await;
}

impl Shared {
    /// Move `run` to `next` unless it was cancelled; returns whether it is still live
    fn transition(&self, run: u64, next: PollerState) -> bool {
        let mut live = false;
        self.control.send_if_modified(|control| {
            live = !control.is_cancelled(run);
            if live && control.state != next {
                control.state = next;
                true
            } else {
                false
            }
        });
        live
    }

    fn is_cancelled(&self, cancel: &Cancel) -> bool {
        match cancel {
            Cancel::Never => false,
            Cancel::Run(run) => self.control.borrow().is_cancelled(*run),
            Cancel::Flag(flag) => flag.load(Ordering::SeqCst),
        }
    }

    fn emit(&self, event: SyncEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }

    /// One fetch cycle, abandoned between pages once `cancel` trips
    async fn fetch_cycle(self: &Arc<Self>, cancel: Cancel) -> Result<FetchOutcome, SyncError> {
        let account_id = self.config.account_id.clone();

        let Some(token) = self.credentials.access_token(&account_id) else {
            info!("[POLL] {}: no access token, skipping cycle", account_id);
            return Ok(FetchOutcome::Skipped);
        };

        let shared = Arc::clone(self);
        let worker_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || shared.fetch_pages(&token, &worker_cancel))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))
            .and_then(|result| result);

        if self.is_cancelled(&cancel) {
            return result;
        }

        match &result {
            Ok(outcome) => self.emit(SyncEvent::Completed {
                account_id,
                outcome: *outcome,
            }),
            Err(e) => {
                error!("[POLL] {}: fetch failed: {}", account_id, e);
                self.emit(SyncEvent::Failed {
                    account_id,
                    error: Arc::new(clone_sync_error(e)),
                });
            }
        }
        result
    }

    /// Pull, persist and forward pages; runs on the blocking pool
    fn fetch_pages(&self, token: &str, cancel: &Cancel) -> Result<FetchOutcome, SyncError> {
        let account_id = self.config.account_id.as_str();
        let start = std::time::Instant::now();

        let cursor = self.cache.load_cursor(account_id)?;
        let validator = cursor.and_then(|c| c.token);
        debug!(
            "[POLL] {}: fetching (validator: {})",
            account_id,
            validator.as_deref().unwrap_or("none")
        );

        let mut stats = FetchStats::default();
        let mut cursor_advanced = false;

        for item in self
            .source
            .fetch(token, validator.as_deref(), &self.config.options)
        {
            if self.is_cancelled(cancel) {
                return self.abandon(account_id, cursor_advanced).map(|_| FetchOutcome::Cancelled);
            }

            let page = match item {
                Ok(page) => page,
                Err(e) => {
                    self.abandon(account_id, cursor_advanced)?;
                    return Err(e.into());
                }
            };

            let page_stats = match self.cache.apply_page(account_id, &page) {
                Ok(page_stats) => page_stats,
                Err(e) => {
                    self.abandon(account_id, cursor_advanced)?;
                    return Err(e.into());
                }
            };
            cursor_advanced |= page.is_first && !page.not_modified;

            stats.pages += 1;
            stats.totals.add(page_stats);
            if page.rate_limit.is_some() {
                stats.rate_limit = page.rate_limit;
            }
            if let Some(limit) = page.rate_limit
                && limit.is_exhausted()
            {
                warn!(
                    "[POLL] {}: rate limit exhausted until {}",
                    account_id, limit.reset_at
                );
            }

            // Stopped while persisting: keep what was written, forward nothing
            if self.is_cancelled(cancel) {
                return self.abandon(account_id, cursor_advanced).map(|_| FetchOutcome::Cancelled);
            }

            let not_modified = page.not_modified;
            self.emit(SyncEvent::Page {
                account_id: account_id.to_string(),
                page: Arc::new(page),
                stats: page_stats,
            });

            if not_modified {
                debug!("[POLL] {}: not modified", account_id);
                return Ok(FetchOutcome::NotModified);
            }
        }

        info!(
            "[POLL] {}: {} pages, {} new, {} updated in {}ms",
            account_id,
            stats.pages,
            stats.totals.inserted,
            stats.totals.updated,
            start.elapsed().as_millis()
        );
        Ok(FetchOutcome::Fetched(stats))
    }

    /// Give up on an unfinished fetch
    ///
    /// If the first page already advanced the cursor, the remaining pages
    /// were never stored, so the validator must not be reused.
    fn abandon(&self, account_id: &str, cursor_advanced: bool) -> Result<(), SyncError> {
        if cursor_advanced {
            self.cache.invalidate_cursor_token(account_id)?;
        }
        Ok(())
    }
}

/// Copy of an error for broadcasting; storage errors keep their message chain
fn clone_sync_error(error: &SyncError) -> SyncError {
    match error {
        SyncError::Api(e) => SyncError::Api(e.clone()),
        SyncError::Storage(e) => SyncError::Storage(anyhow::anyhow!("{:#}", e)),
        SyncError::Worker(msg) => SyncError::Worker(msg.clone()),
    }
}
