//! Inbox query functions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Notification, Scope};
use crate::scope::CompiledScope;
use crate::storage::NotificationStore;

/// Which cached notifications to show
#[derive(Debug, Clone, Default)]
pub struct InboxFilter {
    /// Include threads already read
    pub include_read: bool,
    /// Only threads matching this scope
    pub scope: Option<Scope>,
    /// Maximum number of results (None = all)
    pub limit: Option<usize>,
}

impl InboxFilter {
    pub fn unread() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            include_read: true,
            ..Self::default()
        }
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// List visible notifications, newest first
///
/// Archived threads and threads snoozed past `now` are never included.
pub fn list_inbox(
    store: &dyn NotificationStore,
    account_id: &str,
    filter: &InboxFilter,
) -> Result<Vec<Notification>> {
    list_inbox_at(store, account_id, filter, Utc::now())
}

/// [`list_inbox`] evaluated at a given time
pub fn list_inbox_at(
    store: &dyn NotificationStore,
    account_id: &str,
    filter: &InboxFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>> {
    let scope = filter.scope.clone().map(CompiledScope::new);

    let visible = store
        .list_notifications(account_id)?
        .into_iter()
        .filter(|n| !n.archived && !n.is_snoozed_at(now))
        .filter(|n| filter.include_read || n.unread)
        .filter(|n| scope.as_ref().is_none_or(|s| s.matches(n)));

    Ok(match filter.limit {
        Some(limit) => visible.take(limit).collect(),
        None => visible.collect(),
    })
}

/// Number of visible unread notifications
pub fn unread_count(store: &dyn NotificationStore, account_id: &str) -> Result<usize> {
    Ok(list_inbox(store, account_id, &InboxFilter::unread())?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScopeRule;
    use crate::storage::InMemoryStore;
    use chrono::Duration;

    fn seed(store: &InMemoryStore, now: DateTime<Utc>) {
        let make = |id: &str, repo: &str, age: i64| {
            Notification::builder(id)
                .repo(repo)
                .updated_at(now - Duration::hours(age))
                .build()
        };

        let mut archived = make("archived", "myorg/api", 1);
        archived.archived = true;
        let mut snoozed = make("snoozed", "myorg/api", 2);
        snoozed.snoozed = true;
        snoozed.snooze_until = Some(now + Duration::hours(1));
        let mut woke = make("woke", "myorg/api", 3);
        woke.snoozed = true;
        woke.snooze_until = Some(now - Duration::minutes(1));
        let mut read = make("read", "other/web", 4);
        read.unread = false;

        store
            .save_notifications(
                "acct",
                &[archived, snoozed, woke, read, make("fresh", "other/web", 0)],
            )
            .unwrap();
    }

    fn ids(list: Vec<Notification>) -> Vec<String> {
        list.into_iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn test_list_inbox_hides_archived_and_snoozed() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        seed(&store, now);

        let unread = list_inbox_at(&store, "acct", &InboxFilter::unread(), now).unwrap();
        assert_eq!(ids(unread), vec!["fresh", "woke"]);

        let all = list_inbox_at(&store, "acct", &InboxFilter::all(), now).unwrap();
        assert_eq!(ids(all), vec!["fresh", "woke", "read"]);
    }

    #[test]
    fn test_list_inbox_scope_and_limit() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        seed(&store, now);

        let scoped = InboxFilter::all().in_scope(
            Scope::new("Work").with_rule(ScopeRule::for_organization("myorg")),
        );
        assert_eq!(ids(list_inbox_at(&store, "acct", &scoped, now).unwrap()), vec!["woke"]);

        let limited = InboxFilter::all().limit(1);
        assert_eq!(ids(list_inbox_at(&store, "acct", &limited, now).unwrap()), vec!["fresh"]);
    }

    #[test]
    fn test_unread_count() {
        let store = InMemoryStore::new();
        seed(&store, Utc::now());
        assert_eq!(unread_count(&store, "acct").unwrap(), 2);
        assert_eq!(unread_count(&store, "nobody").unwrap(), 0);
    }
}
