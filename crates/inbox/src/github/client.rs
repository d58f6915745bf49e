//! GitHub notifications API client
//!
//! Fetches notifications as a lazy sequence of pages and performs thread
//! mutations. Uses synchronous HTTP through a [`Transport`] so it can run
//! on any executor's blocking pool.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::api::{ApiNotification, GitHubUser};
use super::headers::{CacheMetadata, RateLimit, parse_next_link, rate_limit_reset};
use super::normalize::normalize_notification;
use super::transport::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::ApiError;
use crate::models::{Notification, ThreadId};

/// Largest `per_page` the notifications endpoint accepts
pub const MAX_PAGE_SIZE: usize = 50;

/// Pages followed in one fetch before giving up on a misbehaving server
pub const DEFAULT_MAX_PAGES: usize = 100;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("lantern/", env!("CARGO_PKG_VERSION"));

/// Coarse server-side filters for a fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Include notifications already marked read
    #[serde(default)]
    pub include_read: bool,
    /// Only notifications the user directly participates in
    #[serde(default)]
    pub participating_only: bool,
}

/// One page of a notifications fetch
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    /// First page of this fetch; only it carries cache metadata
    pub is_first: bool,
    /// The server advertised a next page
    pub has_more: bool,
    /// The conditional request matched: nothing changed since the cursor
    pub not_modified: bool,
    pub cache: CacheMetadata,
    pub rate_limit: Option<RateLimit>,
}

impl NotificationPage {
    /// The single empty page yielded for a 304
    pub fn not_modified(rate_limit: Option<RateLimit>) -> Self {
        Self {
            notifications: Vec::new(),
            is_first: true,
            has_more: false,
            not_modified: true,
            cache: CacheMetadata::default(),
            rate_limit,
        }
    }
}

/// Lazy page sequence; ends after the last page or the first error
pub type PageStream = Box<dyn Iterator<Item = Result<NotificationPage, ApiError>> + Send>;

/// Anything that can produce a page sequence for a poll
pub trait NotificationSource: Send + Sync {
    /// Start a fetch. `cursor` is the stored revalidation token, if any.
    fn fetch(&self, token: &str, cursor: Option<&str>, options: &FetchOptions) -> PageStream;
}

/// GitHub REST client for the notifications API
pub struct GitHubClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    max_pages: usize,
}

impl GitHubClient {
    /// GitHub API base URL
    pub const BASE_URL: &'static str = "https://api.github.com";

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: Self::BASE_URL.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Point the client at another host (GitHub Enterprise, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// URL of the first notifications page
    pub fn notifications_url(&self, options: &FetchOptions) -> String {
        let base = format!("{}/notifications", self.base_url);
        let params = [
            ("per_page", MAX_PAGE_SIZE.to_string()),
            ("all", options.include_read.to_string()),
            ("participating", options.participating_only.to_string()),
        ];
        match url::Url::parse_with_params(&base, &params) {
            Ok(url) => url.into(),
            Err(_) => format!(
                "{}?per_page={}&all={}&participating={}",
                base, MAX_PAGE_SIZE, options.include_read, options.participating_only
            ),
        }
    }

    /// List notifications as a lazy sequence of pages
    ///
    /// `cursor` is sent as `If-None-Match` on the first request only.
    pub fn list_notifications(
        &self,
        token: &str,
        cursor: Option<&str>,
        options: &FetchOptions,
    ) -> NotificationPages {
        NotificationPages {
            transport: Arc::clone(&self.transport),
            token: token.to_string(),
            validator: cursor.map(String::from),
            next_url: Some(self.notifications_url(options)),
            pages_fetched: 0,
            max_pages: self.max_pages,
        }
    }

    /// Mark a single thread as read on the server
    pub fn mark_thread_read(&self, token: &str, thread_id: &ThreadId) -> Result<(), ApiError> {
        let url = format!(
            "{}/notifications/threads/{}",
            self.base_url,
            urlencoding::encode(thread_id.as_str())
        );
        self.execute(api_request(Method::Patch, url, token))?;
        Ok(())
    }

    /// Mark every notification as read, optionally only those updated before `last_read_at`
    pub fn mark_all_read(&self, token: &str, last_read_at: Option<DateTime<Utc>>) -> Result<(), ApiError> {
        let url = format!("{}/notifications", self.base_url);
        let mut body = serde_json::json!({ "read": true });
        if let Some(at) = last_read_at {
            body["last_read_at"] = serde_json::Value::String(at.to_rfc3339());
        }
        self.execute(api_request(Method::Put, url, token).json_body(&body))?;
        Ok(())
    }

    /// Stop receiving notifications for a thread
    pub fn unsubscribe_thread(&self, token: &str, thread_id: &ThreadId) -> Result<(), ApiError> {
        let url = format!(
            "{}/notifications/threads/{}/subscription",
            self.base_url,
            urlencoding::encode(thread_id.as_str())
        );
        self.execute(api_request(Method::Delete, url, token))?;
        Ok(())
    }

    /// Fetch the authenticated user's profile
    pub fn current_user(&self, token: &str) -> Result<GitHubUser, ApiError> {
        let url = format!("{}/user", self.base_url);
        let response = self.execute(api_request(Method::Get, url, token))?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Decoding(e.to_string()))
    }

    /// Send a request and map non-success statuses to errors
    ///
    /// 304 counts as success: mutations on already-read threads answer it.
    fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        debug!("[API] {:?} {}", request.method, request.url);
        let response = self.transport.send(&request)?;
        if response.is_success() || response.status == 304 {
            Ok(response)
        } else {
            Err(status_error(&response))
        }
    }
}

impl NotificationSource for GitHubClient {
    fn fetch(&self, token: &str, cursor: Option<&str>, options: &FetchOptions) -> PageStream {
        Box::new(self.list_notifications(token, cursor, options))
    }
}

/// Build a request carrying the standard API headers
fn api_request(method: Method, url: String, token: &str) -> ApiRequest {
    ApiRequest::new(method, url)
        .header("Authorization", format!("Bearer {}", token))
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", API_VERSION)
        .header("User-Agent", USER_AGENT)
}

/// Classify a non-success response
fn status_error(response: &ApiResponse) -> ApiError {
    match response.status {
        401 => ApiError::AuthenticationFailed,
        403 | 429 => {
            let rate_limit = RateLimit::from_response(response);
            ApiError::RateLimited {
                reset_at: rate_limit_reset(response, rate_limit.as_ref()),
            }
        }
        status => ApiError::ServerError {
            status,
            body: response.body.clone(),
        },
    }
}

/// Iterator over the pages of one notifications fetch
///
/// Each call to `next` performs at most one request. The sequence ends
/// after a page without a `next` link, after a 304, after the first error,
/// or once the page cap is reached.
pub struct NotificationPages {
    transport: Arc<dyn Transport>,
    token: String,
    validator: Option<String>,
    next_url: Option<String>,
    pages_fetched: usize,
    max_pages: usize,
}

impl NotificationPages {
    fn fetch_page(&mut self, url: String) -> Result<NotificationPage, ApiError> {
        let is_first = self.pages_fetched == 0;
        self.pages_fetched += 1;

        let mut request = api_request(Method::Get, url, &self.token);
        // Conditional semantics apply to the collection, not to a page
        if is_first && let Some(validator) = &self.validator {
            request = request.header("If-None-Match", validator.clone());
        }

        debug!("[API] GET {} (page {})", request.url, self.pages_fetched);
        let response = self.transport.send(&request)?;
        let rate_limit = RateLimit::from_response(&response);

        if response.status == 304 {
            debug!("[API] Notifications not modified");
            return Ok(NotificationPage::not_modified(rate_limit));
        }
        if !response.is_success() {
            return Err(status_error(&response));
        }

        let records: Vec<ApiNotification> = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Decoding(e.to_string()))?;

        let next = response.header("link").and_then(parse_next_link);
        let has_more = next.is_some();
        self.next_url = next;

        let cache = if is_first {
            CacheMetadata::from_response(&response)
        } else {
            CacheMetadata::default()
        };

        Ok(NotificationPage {
            notifications: records.into_iter().map(normalize_notification).collect(),
            is_first,
            has_more,
            not_modified: false,
            cache,
            rate_limit,
        })
    }
}

impl Iterator for NotificationPages {
    type Item = Result<NotificationPage, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next_url.take()?;

        if self.pages_fetched >= self.max_pages {
            warn!(
                "[API] Stopping pagination after {} pages; remaining notifications are skipped",
                self.pages_fetched
            );
            return None;
        }

        // next_url is only restored by a successful page, so errors end the sequence
        Some(self.fetch_page(url))
    }
}
