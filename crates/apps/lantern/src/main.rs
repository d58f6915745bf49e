//! Lantern - GitHub notifications in the terminal
//!
//! Keeps a local copy of the notification inbox in sync with GitHub and
//! lets it be listed and triaged offline.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use inbox::{
    ActionHandler, CompiledScope, CredentialProvider, FetchOutcome, GitHubClient,
    GitHubCredentials, InboxFilter, Notification, NotificationCache, Poller, PollerConfig,
    Settings, SqliteStore, SyncEvent, ThreadId, UreqTransport, list_inbox, load_scopes,
    unread_count,
};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Parser)]
#[command(name = "lantern")]
#[command(about = "Sync GitHub notifications into a local inbox")]
struct Cli {
    /// Settings file (defaults to the Lantern config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Notification database, overriding the settings
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll continuously until interrupted
    Poll,
    /// Fetch once and report what changed
    Refresh,
    /// Print the cached inbox
    List {
        /// Include threads already read
        #[arg(long)]
        all: bool,
        /// Only show threads in this scope (from scopes.json)
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Mark a thread read here and on GitHub
    Read { thread_id: String },
    /// Mark everything read here and on GitHub
    ReadAll,
    /// Hide a thread from the inbox
    Archive { thread_id: String },
    /// Hide a thread for a number of hours
    Snooze {
        thread_id: String,
        #[arg(long, default_value_t = 4)]
        hours: i64,
    },
    /// Stop receiving notifications for a thread
    Unsubscribe { thread_id: String },
    /// Show the account the token belongs to
    Whoami,
}

/// Everything a command needs, built from settings
struct Lantern {
    settings: Settings,
    github: Arc<GitHubClient>,
    cache: Arc<NotificationCache>,
    store: Arc<SqliteStore>,
}

impl Lantern {
    fn open(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.settings {
            Some(path) => Settings::from_file(path)?,
            None => Settings::load()?,
        };
        if let Some(path) = &cli.database {
            settings.database_path = Some(path.clone());
        }

        let db_path = settings.database_path()?;
        info!("Opening notification cache at {}", db_path.display());
        let store = Arc::new(SqliteStore::new(&db_path)?);
        let cache = Arc::new(NotificationCache::with_store(store.clone()));

        let transport = Arc::new(UreqTransport::new(Duration::from_secs(
            settings.request_timeout_secs,
        )));
        let github = Arc::new(
            GitHubClient::new(transport)
                .with_base_url(settings.api_base_url.clone())
                .with_max_pages(settings.max_pages),
        );

        Ok(Self {
            settings,
            github,
            cache,
            store,
        })
    }

    fn account_id(&self) -> &str {
        &self.settings.account_id
    }

    fn poller(&self, credentials: Arc<dyn CredentialProvider>) -> Poller {
        let config = PollerConfig::new(self.account_id())
            .with_options(self.settings.fetch_options())
            .with_default_interval(self.settings.default_poll_interval_secs);
        Poller::new(self.github.clone(), self.cache.clone(), credentials, config)
    }

    fn actions(&self, credentials: Arc<dyn CredentialProvider>) -> ActionHandler {
        ActionHandler::new(
            self.github.clone(),
            self.cache.clone(),
            credentials,
            self.account_id(),
        )
    }
}

/// Load the token, explaining where to put one when it is missing
fn credentials() -> Result<Arc<dyn CredentialProvider>> {
    match GitHubCredentials::load() {
        Ok(creds) => Ok(Arc::new(creds)),
        Err(e) => {
            warn!("GitHub token not found: {}", e);
            if let Some(path) = GitHubCredentials::default_token_path() {
                warn!(
                    "To configure GitHub access, either:\n\
                     1. Create {} containing {{\"token\": \"<personal access token>\"}}\n\
                     2. Or set the environment variable LANTERN_GITHUB_TOKEN or GITHUB_TOKEN",
                    path.display()
                );
            }
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config and data directories
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    let lantern = Lantern::open(&cli)?;

    match cli.command {
        Command::Poll => poll(&lantern).await,
        Command::Refresh => refresh(&lantern).await,
        Command::List { all, scope, limit } => list(&lantern, all, scope.as_deref(), limit),
        Command::Read { thread_id } => {
            let actions = lantern.actions(credentials()?);
            blocking(move || actions.mark_read(&ThreadId::new(thread_id))).await?;
            Ok(())
        }
        Command::ReadAll => {
            let actions = lantern.actions(credentials()?);
            let count = blocking(move || actions.mark_all_read(Some(Utc::now()))).await?;
            println!("Marked {} notification(s) read", count);
            Ok(())
        }
        Command::Archive { thread_id } => {
            // Local only, no token needed
            let archived = lantern.cache.archive(lantern.account_id(), &ThreadId::new(thread_id))?;
            if !archived {
                println!("Nothing to archive");
            }
            Ok(())
        }
        Command::Snooze { thread_id, hours } => {
            let until = snooze_deadline(Utc::now(), hours)?;
            let snoozed = lantern.cache.snooze(
                lantern.account_id(),
                &ThreadId::new(thread_id),
                Some(until),
            )?;
            if snoozed {
                println!("Snoozed until {}", until.with_timezone(&Local).format("%a %H:%M"));
            } else {
                println!("Unknown thread");
            }
            Ok(())
        }
        Command::Unsubscribe { thread_id } => {
            let actions = lantern.actions(credentials()?);
            blocking(move || actions.unsubscribe(&ThreadId::new(thread_id))).await?;
            Ok(())
        }
        Command::Whoami => {
            let creds = GitHubCredentials::load()?;
            let github = lantern.github.clone();
            let user = blocking(move || Ok(github.current_user(&creds.token)?)).await?;
            match user.name {
                Some(name) => println!("{} ({})", user.login, name),
                None => println!("{}", user.login),
            }
            Ok(())
        }
    }
}

/// Run a GitHub call on the blocking pool instead of the runtime thread
async fn blocking<T, F>(call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .context("GitHub request task failed")?
}

/// When a snooze of `hours` started at `now` ends
fn snooze_deadline(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    if hours <= 0 {
        bail!("--hours must be positive, got {}", hours);
    }
    let Some(until) = chrono::Duration::try_hours(hours).and_then(|d| now.checked_add_signed(d))
    else {
        bail!("--hours {} is too far in the future", hours);
    };
    Ok(until)
}

/// Poll until Ctrl-C, logging every page as it lands
async fn poll(lantern: &Lantern) -> Result<()> {
    let poller = lantern.poller(credentials()?);
    let mut events = poller.subscribe();

    let cache = lantern.cache.clone();
    let account_id = lantern.account_id().to_string();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    log_event(&event);
                    if matches!(event, SyncEvent::Completed { .. })
                        && let Err(e) = cache.wake_expired_snoozes(&account_id, Utc::now())
                    {
                        warn!("[POLL] Failed to wake snoozed threads: {}", e);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("[POLL] Event listener fell behind, missed {} event(s)", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    poller.start().await;
    info!("Polling as '{}', press Ctrl-C to stop", lantern.account_id());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Stopping");
    poller.shutdown().await;
    listener.abort();
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Page { page, stats, .. } => debug!(
            "[POLL] Page with {} notification(s): {} new, {} updated",
            page.notifications.len(),
            stats.inserted,
            stats.updated
        ),
        SyncEvent::Completed { outcome, .. } => match outcome {
            FetchOutcome::Fetched(stats) => info!(
                "[POLL] {} page(s), {} new, {} updated",
                stats.pages, stats.totals.inserted, stats.totals.updated
            ),
            FetchOutcome::NotModified => debug!("[POLL] No changes"),
            FetchOutcome::Skipped => warn!("[POLL] Skipped, no token"),
            FetchOutcome::Cancelled => debug!("[POLL] Cancelled"),
        },
        SyncEvent::Failed { error, .. } => error!("[POLL] {}", error),
    }
}

async fn refresh(lantern: &Lantern) -> Result<()> {
    let poller = lantern.poller(credentials()?);

    match poller.refresh_now().await {
        Ok(FetchOutcome::Fetched(stats)) => {
            println!(
                "Fetched {} page(s): {} new, {} updated, {} unchanged",
                stats.pages, stats.totals.inserted, stats.totals.updated, stats.totals.unchanged
            );
            if let Some(limit) = stats.rate_limit {
                println!("Rate limit: {}/{} remaining", limit.remaining, limit.limit);
            }
        }
        Ok(FetchOutcome::NotModified) => println!("Already up to date"),
        Ok(FetchOutcome::Skipped) => println!("Skipped: no token for this account"),
        Ok(FetchOutcome::Cancelled) => println!("Cancelled"),
        Err(e) => bail!("refresh failed: {}", e),
    }

    let unread = unread_count(lantern.store.as_ref(), lantern.account_id())?;
    println!("{} unread", unread);
    Ok(())
}

fn list(lantern: &Lantern, all: bool, scope_name: Option<&str>, limit: usize) -> Result<()> {
    let account_id = lantern.account_id();

    let woke = lantern.cache.wake_expired_snoozes(account_id, Utc::now())?;
    if woke > 0 {
        debug!("Woke {} snoozed thread(s)", woke);
    }

    let mut filter = if all {
        InboxFilter::all()
    } else {
        InboxFilter::unread()
    };
    filter = filter.limit(limit);

    let scope = match scope_name {
        Some(name) => {
            let scope = load_scopes()?
                .into_iter()
                .find(|s| s.name.eq_ignore_ascii_case(name))
                .with_context(|| format!("No scope named '{}' in scopes.json", name))?;
            filter = filter.in_scope(scope.clone());
            Some(CompiledScope::new(scope))
        }
        None => None,
    };

    let notifications = list_inbox(lantern.store.as_ref(), account_id, &filter)?;
    if notifications.is_empty() {
        println!("Inbox zero");
        return Ok(());
    }

    let now = Local::now();
    for n in &notifications {
        let marker = match &scope {
            Some(scope) if scope.delivery_for(n, &now).alerts() => "!",
            _ => " ",
        };
        println!("{}{}", marker, format_row(n));
    }
    Ok(())
}

fn format_row(n: &Notification) -> String {
    format!(
        "{} {} {:<30} {:<12} {} [{}]",
        if n.unread { "●" } else { " " },
        n.updated_at.with_timezone(&Local).format("%m-%d %H:%M"),
        n.repository.full_name,
        n.reason.as_str(),
        n.subject.title,
        n.id.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snooze_deadline() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            snooze_deadline(now, 4).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_snooze_deadline_rejects_bad_hours() {
        let now = Utc::now();
        assert!(snooze_deadline(now, 0).is_err());
        assert!(snooze_deadline(now, -3).is_err());
        assert!(snooze_deadline(now, i64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_blocking_runs_off_the_runtime_thread() {
        let outer = std::thread::current().id();
        let inner = blocking(move || Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(inner, outer);

        let err = blocking(|| -> Result<()> { bail!("rejected") }).await.unwrap_err();
        assert_eq!(err.to_string(), "rejected");
    }
}
