//! SQLite-based notification storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{CursorStore, NotificationStore};
use crate::models::{Notification, Reason, Repository, Subject, SyncCursor, ThreadId};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        -- Revalidation cursor per account
        CREATE TABLE sync_cursors (
            account_id TEXT PRIMARY KEY,
            token TEXT,
            last_poll_at TEXT NOT NULL,
            poll_interval_secs INTEGER NOT NULL DEFAULT 60
        );

        -- Cached notification threads
        CREATE TABLE notifications (
            account_id TEXT NOT NULL,
            id TEXT NOT NULL,
            unread INTEGER NOT NULL,
            reason TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_read_at TEXT,
            subject_title TEXT NOT NULL,
            subject_kind TEXT NOT NULL,
            subject_url TEXT,
            latest_comment_url TEXT,
            repo_id INTEGER NOT NULL,
            repo_name TEXT NOT NULL,
            repo_full_name TEXT NOT NULL,
            repo_owner_login TEXT NOT NULL,
            repo_owner_avatar_url TEXT NOT NULL,
            repo_private INTEGER NOT NULL DEFAULT 0,
            -- Local-only state
            archived INTEGER NOT NULL DEFAULT 0,
            snoozed INTEGER NOT NULL DEFAULT 0,
            snooze_until TEXT,
            read_locally_at TEXT,
            last_fetched_at TEXT NOT NULL,
            PRIMARY KEY (account_id, id)
        );

        CREATE INDEX idx_notifications_updated_at
            ON notifications(account_id, updated_at DESC);
        "#,
    )])
}

const NOTIFICATION_COLUMNS: &str = "id, unread, reason, updated_at, last_read_at,
    subject_title, subject_kind, subject_url, latest_comment_url,
    repo_id, repo_name, repo_full_name, repo_owner_login, repo_owner_avatar_url, repo_private,
    archived, snoozed, snooze_until, read_locally_at, last_fetched_at";

/// SQLite-based notification and cursor storage
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        info!("[STORE] Opened {}", db_path.as_ref().display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets the UI read while a poll writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;
        debug!("[STORE] Schema up to date");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", value))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

/// Raw column values; timestamps are parsed outside the rusqlite closure
struct NotificationRow {
    id: String,
    unread: bool,
    reason: String,
    updated_at: String,
    last_read_at: Option<String>,
    subject_title: String,
    subject_kind: String,
    subject_url: Option<String>,
    latest_comment_url: Option<String>,
    repo_id: i64,
    repo_name: String,
    repo_full_name: String,
    repo_owner_login: String,
    repo_owner_avatar_url: String,
    repo_private: bool,
    archived: bool,
    snoozed: bool,
    snooze_until: Option<String>,
    read_locally_at: Option<String>,
    last_fetched_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            unread: row.get(1)?,
            reason: row.get(2)?,
            updated_at: row.get(3)?,
            last_read_at: row.get(4)?,
            subject_title: row.get(5)?,
            subject_kind: row.get(6)?,
            subject_url: row.get(7)?,
            latest_comment_url: row.get(8)?,
            repo_id: row.get(9)?,
            repo_name: row.get(10)?,
            repo_full_name: row.get(11)?,
            repo_owner_login: row.get(12)?,
            repo_owner_avatar_url: row.get(13)?,
            repo_private: row.get(14)?,
            archived: row.get(15)?,
            snoozed: row.get(16)?,
            snooze_until: row.get(17)?,
            read_locally_at: row.get(18)?,
            last_fetched_at: row.get(19)?,
        })
    }

    fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: ThreadId::new(self.id),
            unread: self.unread,
            reason: self.reason.parse().unwrap_or(Reason::Other),
            updated_at: parse_timestamp(&self.updated_at)?,
            last_read_at: parse_optional_timestamp(self.last_read_at)?,
            subject: Subject {
                title: self.subject_title,
                kind: self.subject_kind,
                url: self.subject_url,
                latest_comment_url: self.latest_comment_url,
            },
            repository: Repository {
                id: self.repo_id as u64,
                name: self.repo_name,
                full_name: self.repo_full_name,
                owner_login: self.repo_owner_login,
                owner_avatar_url: self.repo_owner_avatar_url,
                private: self.repo_private,
            },
            archived: self.archived,
            snoozed: self.snoozed,
            snooze_until: parse_optional_timestamp(self.snooze_until)?,
            read_locally_at: parse_optional_timestamp(self.read_locally_at)?,
            last_fetched_at: parse_timestamp(&self.last_fetched_at)?,
        })
    }
}

impl NotificationStore for SqliteStore {
    fn get_notification(&self, account_id: &str, id: &ThreadId) -> Result<Option<Notification>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM notifications WHERE account_id = ? AND id = ?",
                    NOTIFICATION_COLUMNS
                ),
                params![account_id, id.as_str()],
                NotificationRow::from_row,
            )
            .optional()?;

        row.map(NotificationRow::into_notification).transpose()
    }

    fn save_notifications(&self, account_id: &str, batch: &[Notification]) -> Result<()> {
        let mut conn = self.conn()?;

        // One transaction per batch: a failure leaves earlier batches intact
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO notifications
                 (account_id, id, unread, reason, updated_at, last_read_at,
                  subject_title, subject_kind, subject_url, latest_comment_url,
                  repo_id, repo_name, repo_full_name, repo_owner_login, repo_owner_avatar_url, repo_private,
                  archived, snoozed, snooze_until, read_locally_at, last_fetched_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(account_id, id) DO UPDATE SET
                    unread = excluded.unread,
                    reason = excluded.reason,
                    updated_at = excluded.updated_at,
                    last_read_at = excluded.last_read_at,
                    subject_title = excluded.subject_title,
                    subject_kind = excluded.subject_kind,
                    subject_url = excluded.subject_url,
                    latest_comment_url = excluded.latest_comment_url,
                    repo_id = excluded.repo_id,
                    repo_name = excluded.repo_name,
                    repo_full_name = excluded.repo_full_name,
                    repo_owner_login = excluded.repo_owner_login,
                    repo_owner_avatar_url = excluded.repo_owner_avatar_url,
                    repo_private = excluded.repo_private,
                    archived = excluded.archived,
                    snoozed = excluded.snoozed,
                    snooze_until = excluded.snooze_until,
                    read_locally_at = excluded.read_locally_at,
                    last_fetched_at = excluded.last_fetched_at",
            )?;

            for n in batch {
                stmt.execute(params![
                    account_id,
                    n.id.as_str(),
                    n.unread,
                    n.reason.as_str(),
                    n.updated_at.to_rfc3339(),
                    n.last_read_at.map(|t| t.to_rfc3339()),
                    n.subject.title,
                    n.subject.kind,
                    n.subject.url,
                    n.subject.latest_comment_url,
                    n.repository.id as i64,
                    n.repository.name,
                    n.repository.full_name,
                    n.repository.owner_login,
                    n.repository.owner_avatar_url,
                    n.repository.private,
                    n.archived,
                    n.snoozed,
                    n.snooze_until.map(|t| t.to_rfc3339()),
                    n.read_locally_at.map(|t| t.to_rfc3339()),
                    n.last_fetched_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        debug!("[STORE] {}: wrote {} notifications", account_id, batch.len());
        Ok(())
    }

    fn list_notifications(&self, account_id: &str) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE account_id = ? ORDER BY updated_at DESC, id ASC",
            NOTIFICATION_COLUMNS
        ))?;

        let rows = stmt
            .query_map([account_id], NotificationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    fn count_notifications(&self, account_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_account(&self, account_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notifications WHERE account_id = ?", [account_id])?;
        tx.execute("DELETE FROM sync_cursors WHERE account_id = ?", [account_id])?;
        tx.commit()?;
        Ok(())
    }
}

impl CursorStore for SqliteStore {
    fn get_sync_cursor(&self, account_id: &str) -> Result<Option<SyncCursor>> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>, String, i64)> = conn
            .query_row(
                "SELECT account_id, token, last_poll_at, poll_interval_secs
                 FROM sync_cursors WHERE account_id = ?",
                [account_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((account_id, token, last_poll_at, poll_interval_secs)) = row else {
            return Ok(None);
        };

        Ok(Some(SyncCursor {
            account_id,
            token,
            last_poll_at: parse_timestamp(&last_poll_at)?,
            poll_interval_secs: poll_interval_secs.max(0) as u64,
        }))
    }

    fn save_sync_cursor(&self, cursor: SyncCursor) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_cursors (account_id, token, last_poll_at, poll_interval_secs)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
                token = excluded.token,
                last_poll_at = excluded.last_poll_at,
                poll_interval_secs = excluded.poll_interval_secs",
            params![
                cursor.account_id,
                cursor.token,
                cursor.last_poll_at.to_rfc3339(),
                cursor.poll_interval_secs as i64
            ],
        )?;
        Ok(())
    }

    fn delete_sync_cursor(&self, account_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sync_cursors WHERE account_id = ?", [account_id])?;
        Ok(())
    }
}
