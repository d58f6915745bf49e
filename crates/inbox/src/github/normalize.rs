//! GitHub API response normalization
//!
//! Converts GitHub API records to domain models.

use chrono::Utc;

use super::api::ApiNotification;
use crate::models::{Notification, Repository, Subject, ThreadId};

/// Normalize a GitHub notification record to a Notification
///
/// Local-only fields start at their first-sighting defaults.
pub fn normalize_notification(api: ApiNotification) -> Notification {
    Notification {
        id: ThreadId::new(api.id),
        unread: api.unread,
        reason: api.reason,
        updated_at: api.updated_at,
        last_read_at: api.last_read_at,
        subject: Subject {
            title: api.subject.title,
            kind: api.subject.kind,
            url: api.subject.url,
            latest_comment_url: api.subject.latest_comment_url,
        },
        repository: Repository {
            id: api.repository.id,
            name: api.repository.name,
            full_name: api.repository.full_name,
            owner_login: api.repository.owner.login,
            owner_avatar_url: api.repository.owner.avatar_url,
            private: api.repository.private,
        },
        archived: false,
        snoozed: false,
        snooze_until: None,
        read_locally_at: None,
        last_fetched_at: Utc::now(),
    }
}

/// Browser URL for a subject API URL
///
/// `https://api.github.com/repos/o/r/pulls/1` becomes
/// `https://github.com/o/r/pull/1`. Unknown shapes are returned unchanged.
pub fn web_url_for(api_url: &str) -> String {
    let Some(rest) = api_url.strip_prefix("https://api.github.com/repos/") else {
        return api_url.to_string();
    };

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        [owner, repo, "pulls", number] => format!("https://github.com/{owner}/{repo}/pull/{number}"),
        [owner, repo, "commits", sha] => format!("https://github.com/{owner}/{repo}/commit/{sha}"),
        // Releases are addressed by id in the API; the list page is the best we can do
        [owner, repo, "releases", _] => format!("https://github.com/{owner}/{repo}/releases"),
        [owner, repo, tail @ ..] => {
            let mut url = format!("https://github.com/{owner}/{repo}");
            for segment in tail {
                url.push('/');
                url.push_str(segment);
            }
            url
        }
        _ => api_url.to_string(),
    }
}
