//! GitHub API integration
//!
//! This module provides:
//! - A transport seam over synchronous HTTP
//! - The notifications client with conditional, paginated fetching
//! - Header parsing for pagination, rate limits and cache validators
//! - Response normalization to domain models

mod client;
mod headers;
mod normalize;
mod transport;

pub use client::{
    DEFAULT_MAX_PAGES, FetchOptions, GitHubClient, MAX_PAGE_SIZE, NotificationPage,
    NotificationPages, NotificationSource, PageStream,
};
pub use headers::{CacheMetadata, RateLimit, parse_next_link};
pub use normalize::{normalize_notification, web_url_for};
pub use transport::{ApiRequest, ApiResponse, Method, Transport, UreqTransport};

/// GitHub API response types
pub mod api {
    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use crate::models::Reason;

    /// A notification thread as returned by `GET /notifications`
    #[derive(Debug, Deserialize)]
    pub struct ApiNotification {
        pub id: String,
        pub unread: bool,
        pub reason: Reason,
        pub updated_at: DateTime<Utc>,
        pub last_read_at: Option<DateTime<Utc>>,
        pub subject: ApiSubject,
        pub repository: ApiRepository,
        #[serde(default)]
        pub url: Option<String>,
        #[serde(default)]
        pub subscription_url: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ApiSubject {
        pub title: String,
        pub url: Option<String>,
        #[serde(default)]
        pub latest_comment_url: Option<String>,
        #[serde(rename = "type")]
        pub kind: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ApiRepository {
        pub id: u64,
        pub name: String,
        pub full_name: String,
        #[serde(default)]
        pub private: bool,
        pub owner: ApiOwner,
    }

    #[derive(Debug, Deserialize)]
    pub struct ApiOwner {
        pub login: String,
        #[serde(default)]
        pub avatar_url: String,
    }

    /// The authenticated user (`GET /user`)
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct GitHubUser {
        pub login: String,
        pub id: u64,
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub avatar_url: String,
    }
}
