//! Integration tests for the inbox crate
//!
//! These tests drive the real client, reconciliation and scheduler against
//! a fake HTTP transport, from fetching to querying.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use inbox::error::{ApiError, SyncError};
use inbox::github::{ApiRequest, ApiResponse, GitHubClient, Transport};
use inbox::models::{Scope, ScopeRule, SyncCursor, ThreadId};
use inbox::query::{InboxFilter, list_inbox};
use inbox::storage::{CursorStore, InMemoryStore, NotificationStore, SqliteStore};
use inbox::sync::{
    FetchOutcome, NotificationCache, Poller, PollerConfig, StaticToken, SyncEvent,
};
use inbox::ActionHandler;
use tempfile::TempDir;

const FIRST_PAGE_URL: &str =
    "https://api.test/notifications?per_page=50&all=false&participating=false";

/// Fake GitHub serving fixed responses per URL
///
/// A first-page request whose `If-None-Match` equals `etag` is answered
/// with 304, like the real API.
#[derive(Default)]
struct FakeGitHub {
    routes: Mutex<HashMap<String, ApiResponse>>,
    etag: Mutex<Option<String>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeGitHub {
    fn route(&self, url: &str, response: ApiResponse) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    fn set_etag(&self, etag: &str) {
        *self.etag.lock().unwrap() = Some(etag.to_string());
    }

    fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeGitHub {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());

        let etag = self.etag.lock().unwrap().clone();
        if request.url == FIRST_PAGE_URL
            && etag.is_some()
            && request.header_value("If-None-Match") == etag.as_deref()
        {
            return Ok(ApiResponse::new(304, vec![], ""));
        }

        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| ApiError::Network(format!("no route for {}", request.url)))
    }
}

fn notification_json(id: &str, repo: &str, unread: bool, updated_at: &str) -> String {
    let (owner, name) = repo.split_once('/').unwrap();
    format!(
        r#"{{
            "id": "{id}",
            "unread": {unread},
            "reason": "review_requested",
            "updated_at": "{updated_at}",
            "last_read_at": null,
            "subject": {{
                "title": "Pull request {id}",
                "url": "https://api.github.com/repos/{repo}/pulls/{id}",
                "latest_comment_url": null,
                "type": "PullRequest"
            }},
            "repository": {{
                "id": 42, "name": "{name}", "full_name": "{repo}", "private": false,
                "owner": {{ "login": "{owner}", "avatar_url": "https://avatars.test/{owner}" }}
            }},
            "url": "https://api.github.com/notifications/threads/{id}"
        }}"#
    )
}

fn page_response(ids: std::ops::Range<usize>, headers: &[(&str, &str)]) -> ApiResponse {
    let items: Vec<String> = ids
        .map(|i| notification_json(&format!("n{}", i), "myorg/backend", true, "2024-05-01T10:00:00Z"))
        .collect();
    ApiResponse::new(
        200,
        headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        format!("[{}]", items.join(",")),
    )
}

fn setup_sqlite() -> (Arc<SqliteStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("inbox.test.sqlite")).unwrap());
    (store, dir)
}

fn poller_for<S>(github: Arc<FakeGitHub>, store: Arc<S>) -> (Poller, Arc<NotificationCache>)
where
    S: NotificationStore + CursorStore + 'static,
{
    let client = GitHubClient::new(github).with_base_url("https://api.test");
    let cache = Arc::new(NotificationCache::with_store(store));
    let poller = Poller::new(
        Arc::new(client),
        cache.clone(),
        Arc::new(StaticToken::new("ghp_test")),
        PollerConfig::new("octocat"),
    );
    (poller, cache)
}

#[tokio::test]
async fn test_two_page_fetch_into_sqlite() {
    let github = Arc::new(FakeGitHub::default());
    github.route(
        FIRST_PAGE_URL,
        page_response(
            0..100,
            &[
                ("ETag", "W/\"page-one\""),
                ("X-Poll-Interval", "60"),
                ("Link", "<https://api.test/notifications?page=2>; rel=\"next\", <https://api.test/notifications?page=2>; rel=\"last\""),
                ("X-RateLimit-Limit", "5000"),
                ("X-RateLimit-Remaining", "4999"),
                ("X-RateLimit-Reset", "1714557600"),
                ("X-RateLimit-Used", "1"),
            ],
        ),
    );
    github.route(
        "https://api.test/notifications?page=2",
        page_response(100..137, &[("ETag", "W/\"page-two\"")]),
    );

    let (store, _dir) = setup_sqlite();
    let (poller, _cache) = poller_for(github.clone(), store.clone());
    let mut events = poller.subscribe();

    let outcome = poller.refresh_now().await.unwrap();
    let FetchOutcome::Fetched(stats) = outcome else {
        panic!("expected a full fetch, got {:?}", outcome);
    };
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.totals.inserted, 137);

    assert_eq!(store.count_notifications("octocat").unwrap(), 137);
    let cursor = store.get_sync_cursor("octocat").unwrap().unwrap();
    assert_eq!(cursor.token.as_deref(), Some("W/\"page-one\""));
    assert_eq!(cursor.poll_interval_secs, 60);

    // Pages arrive in API order, page 1 first
    let mut sizes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Page { page, .. } = event {
            sizes.push((page.is_first, page.notifications.len()));
        }
    }
    assert_eq!(sizes, vec![(true, 100), (false, 37)]);

    let requests = github.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header_value("If-None-Match"), None);
    assert_eq!(requests[1].header_value("If-None-Match"), None);
}

#[tokio::test]
async fn test_not_modified_poll_changes_nothing() {
    let github = Arc::new(FakeGitHub::default());
    github.set_etag("W/\"abc\"");

    let store = Arc::new(InMemoryStore::new());
    let cursor = SyncCursor::new("octocat", Some("W/\"abc\"".to_string())).with_poll_interval(60);
    store.save_sync_cursor(cursor.clone()).unwrap();

    let (poller, _cache) = poller_for(github.clone(), store.clone());
    assert_eq!(poller.refresh_now().await.unwrap(), FetchOutcome::NotModified);

    assert_eq!(store.get_sync_cursor("octocat").unwrap(), Some(cursor));
    assert_eq!(store.count_notifications("octocat").unwrap(), 0);
    assert_eq!(
        github.requests()[0].header_value("If-None-Match"),
        Some("W/\"abc\"")
    );
}

#[tokio::test]
async fn test_second_poll_revalidates_with_stored_cursor() {
    let github = Arc::new(FakeGitHub::default());
    github.route(FIRST_PAGE_URL, page_response(0..3, &[("ETag", "\"v1\"")]));
    github.set_etag("\"v1\"");

    let (store, _dir) = setup_sqlite();
    let (poller, _cache) = poller_for(github.clone(), store.clone());

    assert!(matches!(poller.refresh_now().await.unwrap(), FetchOutcome::Fetched(_)));
    assert_eq!(poller.refresh_now().await.unwrap(), FetchOutcome::NotModified);
    assert_eq!(store.count_notifications("octocat").unwrap(), 3);
}

#[tokio::test]
async fn test_local_read_survives_repoll() {
    let github = Arc::new(FakeGitHub::default());
    github.route(FIRST_PAGE_URL, page_response(0..2, &[]));

    let (store, _dir) = setup_sqlite();
    let (poller, cache) = poller_for(github.clone(), store.clone());
    poller.refresh_now().await.unwrap();

    // Marking read succeeds locally even though the fake has no route for it
    let handler = ActionHandler::new(
        Arc::new(GitHubClient::new(github.clone()).with_base_url("https://api.test")),
        cache,
        Arc::new(StaticToken::new("ghp_test")),
        "octocat",
    );
    assert!(handler.mark_read(&ThreadId::new("n0")).is_err());

    // GitHub still reports the thread unread with the same updated_at
    let outcome = poller.refresh_now().await.unwrap();
    let FetchOutcome::Fetched(stats) = outcome else {
        panic!("expected a full fetch, got {:?}", outcome);
    };
    assert_eq!(stats.totals.updated, 0);
    assert_eq!(stats.totals.unchanged, 2);

    let n0 = store
        .get_notification("octocat", &ThreadId::new("n0"))
        .unwrap()
        .unwrap();
    assert!(!n0.unread);
}

#[tokio::test]
async fn test_archive_and_snooze_survive_remote_changes() {
    let github = Arc::new(FakeGitHub::default());
    github.route(FIRST_PAGE_URL, page_response(0..2, &[]));

    let store = Arc::new(InMemoryStore::new());
    let (poller, cache) = poller_for(github.clone(), store.clone());
    poller.refresh_now().await.unwrap();

    let until = Utc::now() + Duration::hours(4);
    cache.archive("octocat", &ThreadId::new("n0")).unwrap();
    cache.snooze("octocat", &ThreadId::new("n1"), Some(until)).unwrap();

    // The remote marks both read and bumps their activity time
    let items = [
        notification_json("n0", "myorg/backend", false, "2024-05-02T09:00:00Z"),
        notification_json("n1", "myorg/backend", false, "2024-05-02T09:00:00Z"),
    ];
    github.route(
        FIRST_PAGE_URL,
        ApiResponse::new(200, vec![], format!("[{}]", items.join(","))),
    );
    poller.refresh_now().await.unwrap();

    let n0 = store.get_notification("octocat", &ThreadId::new("n0")).unwrap().unwrap();
    let n1 = store.get_notification("octocat", &ThreadId::new("n1")).unwrap().unwrap();
    assert!(!n0.unread && n0.archived);
    assert!(!n1.unread && n1.snoozed);
    assert_eq!(n1.snooze_until, Some(until));
    assert_eq!(n1.updated_at.to_rfc3339(), "2024-05-02T09:00:00+00:00");
}

#[tokio::test]
async fn test_rate_limit_surfaces_reset_time() {
    let github = Arc::new(FakeGitHub::default());
    let reset = (Utc::now() + Duration::minutes(12) + Duration::seconds(30)).timestamp();
    github.route(
        FIRST_PAGE_URL,
        ApiResponse::new(
            403,
            vec![
                ("X-RateLimit-Limit".into(), "5000".into()),
                ("X-RateLimit-Remaining".into(), "0".into()),
                ("X-RateLimit-Reset".into(), reset.to_string()),
            ],
            r#"{"message":"API rate limit exceeded"}"#,
        ),
    );

    let store = Arc::new(InMemoryStore::new());
    let (poller, _cache) = poller_for(github, store);

    let err = poller.refresh_now().await.unwrap_err();
    assert!(matches!(err, SyncError::Api(ApiError::RateLimited { reset_at: Some(_) })));
    assert!(err.rate_limit_reset().is_some());
    assert!(err.to_string().starts_with("Rate limited, resets in 1"));
}

#[tokio::test]
async fn test_authentication_failure_is_terminal() {
    let github = Arc::new(FakeGitHub::default());
    github.route(FIRST_PAGE_URL, ApiResponse::new(401, vec![], r#"{"message":"Bad credentials"}"#));

    let store = Arc::new(InMemoryStore::new());
    let (poller, _cache) = poller_for(github.clone(), store);

    let err = poller.refresh_now().await.unwrap_err();
    assert!(matches!(err, SyncError::Api(ApiError::AuthenticationFailed)));
    assert_eq!(github.requests().len(), 1);
}

#[tokio::test]
async fn test_scoped_inbox_after_sync() {
    let github = Arc::new(FakeGitHub::default());
    let items = [
        notification_json("a", "myorg/backend", true, "2024-05-01T10:00:00Z"),
        notification_json("b", "otherorg/web", true, "2024-05-01T11:00:00Z"),
        notification_json("c", "MyOrg/frontend", false, "2024-05-01T12:00:00Z"),
    ];
    github.route(
        FIRST_PAGE_URL,
        ApiResponse::new(200, vec![], format!("[{}]", items.join(","))),
    );

    let (store, _dir) = setup_sqlite();
    let (poller, _cache) = poller_for(github, store.clone());
    poller.refresh_now().await.unwrap();

    let work = Scope::new("Work").with_rule(ScopeRule::for_repository("myorg/*"));
    let ids = |filter: InboxFilter| -> Vec<String> {
        list_inbox(store.as_ref(), "octocat", &filter)
            .unwrap()
            .into_iter()
            .map(|n| n.id.0)
            .collect()
    };

    assert_eq!(ids(InboxFilter::unread()), vec!["b", "a"]);
    assert_eq!(ids(InboxFilter::all().in_scope(work.clone())), vec!["c", "a"]);
    assert_eq!(ids(InboxFilter::unread().in_scope(work)), vec!["a"]);
    assert_eq!(ids(InboxFilter::all().in_scope(Scope::default_scope("All"))).len(), 3);
}
