//! Notification model representing a GitHub notification thread

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a notification thread (GitHub thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why the user received a notification
///
/// Serialized as the GitHub wire name; unknown names become [`Reason::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Reason {
    Mention,
    Assign,
    ReviewRequested,
    Subscribed,
    TeamMention,
    Comment,
    Author,
    Invitation,
    SecurityAlert,
    StateChange,
    CiActivity,
    Manual,
    /// A reason GitHub added after this client was written
    Other,
}

impl Reason {
    pub const ALL: [Reason; 12] = [
        Reason::Mention,
        Reason::Assign,
        Reason::ReviewRequested,
        Reason::Subscribed,
        Reason::TeamMention,
        Reason::Comment,
        Reason::Author,
        Reason::Invitation,
        Reason::SecurityAlert,
        Reason::StateChange,
        Reason::CiActivity,
        Reason::Manual,
    ];

    /// Wire name as used by the GitHub API
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Mention => "mention",
            Reason::Assign => "assign",
            Reason::ReviewRequested => "review_requested",
            Reason::Subscribed => "subscribed",
            Reason::TeamMention => "team_mention",
            Reason::Comment => "comment",
            Reason::Author => "author",
            Reason::Invitation => "invitation",
            Reason::SecurityAlert => "security_alert",
            Reason::StateChange => "state_change",
            Reason::CiActivity => "ci_activity",
            Reason::Manual => "manual",
            Reason::Other => "other",
        }
    }
}

impl FromStr for Reason {
    type Err = std::convert::Infallible;

    /// Unknown names map to [`Reason::Other`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Reason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .unwrap_or(Reason::Other))
    }
}

impl From<String> for Reason {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Reason::Other)
    }
}

impl From<Reason> for String {
    fn from(reason: Reason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the notification is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub title: String,
    /// GitHub subject type ("Issue", "PullRequest", "Release", ...)
    pub kind: String,
    /// API URL of the subject, absent for some kinds (e.g. CheckSuite)
    pub url: Option<String>,
    pub latest_comment_url: Option<String>,
}

/// Repository the notification belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    /// "owner/name"
    pub full_name: String,
    pub owner_login: String,
    pub owner_avatar_url: String,
    pub private: bool,
}

/// A notification thread as cached locally
///
/// Remote-owned fields are refreshed by reconciliation. The local-only
/// fields (`archived`, `snoozed`, `snooze_until`) exist only on this side
/// and are changed exclusively by user actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// GitHub thread ID, the merge key
    pub id: ThreadId,
    pub unread: bool,
    pub reason: Reason,
    /// Server-authoritative last activity time
    pub updated_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub subject: Subject,
    pub repository: Repository,

    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub snoozed: bool,
    #[serde(default)]
    pub snooze_until: Option<DateTime<Utc>>,

    /// When the user marked this thread read on this device. While set, a
    /// remote `unread = true` with `updated_at <= read_locally_at` is stale.
    #[serde(default)]
    pub read_locally_at: Option<DateTime<Utc>>,
    /// Last time reconciliation changed this record
    pub last_fetched_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new notification builder
    pub fn builder(id: impl Into<ThreadId>) -> NotificationBuilder {
        NotificationBuilder::new(id.into())
    }

    /// Whether the thread is hidden by an active snooze at `now`
    pub fn is_snoozed_at(&self, now: DateTime<Utc>) -> bool {
        self.snoozed && self.snooze_until.is_none_or(|until| until > now)
    }

    /// Reset the local-only fields to their first-sighting defaults
    pub(crate) fn reset_local_state(&mut self) {
        self.archived = false;
        self.snoozed = false;
        self.snooze_until = None;
        self.read_locally_at = None;
    }
}

/// Builder for creating Notification instances
pub struct NotificationBuilder {
    id: ThreadId,
    unread: bool,
    reason: Reason,
    updated_at: Option<DateTime<Utc>>,
    last_read_at: Option<DateTime<Utc>>,
    title: String,
    kind: String,
    url: Option<String>,
    latest_comment_url: Option<String>,
    repository: Repository,
}

impl NotificationBuilder {
    fn new(id: ThreadId) -> Self {
        Self {
            id,
            unread: true,
            reason: Reason::Subscribed,
            updated_at: None,
            last_read_at: None,
            title: String::new(),
            kind: "Issue".to_string(),
            url: None,
            latest_comment_url: None,
            repository: Repository {
                id: 0,
                name: String::new(),
                full_name: String::new(),
                owner_login: String::new(),
                owner_avatar_url: String::new(),
                private: false,
            },
        }
    }

    pub fn unread(mut self, unread: bool) -> Self {
        self.unread = unread;
        self
    }

    pub fn reason(mut self, reason: Reason) -> Self {
        self.reason = reason;
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn last_read_at(mut self, last_read_at: Option<DateTime<Utc>>) -> Self {
        self.last_read_at = last_read_at;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn latest_comment_url(mut self, url: Option<String>) -> Self {
        self.latest_comment_url = url;
        self
    }

    pub fn repository(mut self, repository: Repository) -> Self {
        self.repository = repository;
        self
    }

    /// Shorthand for a repository identified only by "owner/name"
    pub fn repo(mut self, full_name: &str) -> Self {
        let (owner, name) = full_name.split_once('/').unwrap_or(("", full_name));
        self.repository = Repository {
            id: 0,
            name: name.to_string(),
            full_name: full_name.to_string(),
            owner_login: owner.to_string(),
            owner_avatar_url: String::new(),
            private: false,
        };
        self
    }

    pub fn build(self) -> Notification {
        let now = Utc::now();
        Notification {
            id: self.id,
            unread: self.unread,
            reason: self.reason,
            updated_at: self.updated_at.unwrap_or(now),
            last_read_at: self.last_read_at,
            subject: Subject {
                title: self.title,
                kind: self.kind,
                url: self.url,
                latest_comment_url: self.latest_comment_url,
            },
            repository: self.repository,
            archived: false,
            snoozed: false,
            snooze_until: None,
            read_locally_at: None,
            last_fetched_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reason_wire_names() {
        let reason: Reason = serde_json::from_str("\"review_requested\"").unwrap();
        assert_eq!(reason, Reason::ReviewRequested);

        let reason: Reason = serde_json::from_str("\"approval_requested\"").unwrap();
        assert_eq!(reason, Reason::Other);

        assert_eq!("ci_activity".parse::<Reason>().unwrap(), Reason::CiActivity);
        assert_eq!("nonsense".parse::<Reason>().unwrap(), Reason::Other);
    }

    #[test]
    fn test_builder_repo_shorthand() {
        let n = Notification::builder("1").repo("rust-lang/rust").build();
        assert_eq!(n.repository.owner_login, "rust-lang");
        assert_eq!(n.repository.name, "rust");
        assert!(n.unread);
        assert!(!n.archived);
    }

    #[test]
    fn test_is_snoozed_at() {
        let now = Utc::now();
        let mut n = Notification::builder("1").build();
        assert!(!n.is_snoozed_at(now));

        n.snoozed = true;
        n.snooze_until = Some(now + Duration::hours(1));
        assert!(n.is_snoozed_at(now));
        assert!(!n.is_snoozed_at(now + Duration::hours(2)));

        // Snoozed without a deadline stays hidden until unsnoozed
        n.snooze_until = None;
        assert!(n.is_snoozed_at(now + Duration::days(30)));
    }
}
