//! Response header parsing: pagination links, rate limits, cache validators

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::transport::ApiResponse;

/// Rate limit counters reported on every API response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Total request budget for the window
    pub limit: u32,
    pub remaining: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
    pub used: u32,
}

impl RateLimit {
    /// Parse the `x-ratelimit-*` headers
    ///
    /// Returns `None` unless limit, remaining and reset are all present.
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        let limit: u32 = response.header("x-ratelimit-limit")?.trim().parse().ok()?;
        let remaining: u32 = response
            .header("x-ratelimit-remaining")?
            .trim()
            .parse()
            .ok()?;
        let reset_epoch: i64 = response.header("x-ratelimit-reset")?.trim().parse().ok()?;
        let reset_at = Utc.timestamp_opt(reset_epoch, 0).single()?;
        let used = response
            .header("x-ratelimit-used")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(|| limit.saturating_sub(remaining));

        Some(Self {
            limit,
            remaining,
            reset_at,
            used,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Conditional-cache metadata of a response (meaningful on a first page)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// New revalidation token to persist
    pub etag: Option<String>,
    /// Server-advised minimum seconds between polls
    pub poll_interval_secs: Option<u64>,
}

impl CacheMetadata {
    pub fn from_response(response: &ApiResponse) -> Self {
        Self {
            etag: response
                .header("etag")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
            poll_interval_secs: response
                .header("x-poll-interval")
                .and_then(|v| v.trim().parse().ok()),
        }
    }
}

/// Extract the `rel="next"` target from a Link header
///
/// Format: `<url>; rel="next", <url>; rel="last"`
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        });

        is_next.then(|| url.to_string())
    })
}

/// When a rate-limited client may try again
///
/// `retry-after` (secondary limits) wins over the primary window reset. A
/// delay too large to represent falls back to the window reset.
pub fn rate_limit_reset(response: &ApiResponse, rate_limit: Option<&RateLimit>) -> Option<DateTime<Utc>> {
    let retry_at = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(Duration::try_seconds)
        .and_then(|delay| Utc::now().checked_add_signed(delay));
    retry_at.or_else(|| rate_limit.map(|r| r.reset_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: &[(&str, &str)]) -> ApiResponse {
        ApiResponse::new(200, headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(), "")
    }

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://api.github.com/notifications?page=2&per_page=50>; rel="next", <https://api.github.com/notifications?page=5&per_page=50>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/notifications?page=2&per_page=50")
        );
    }

    #[test]
    fn test_parse_next_link_absent() {
        let header = r#"<https://api.github.com/notifications?page=1>; rel="prev", <https://api.github.com/notifications?page=1>; rel="first""#;
        assert!(parse_next_link(header).is_none());
        assert!(parse_next_link("").is_none());
        assert!(parse_next_link("garbage").is_none());
    }

    #[test]
    fn test_parse_next_link_multi_rel() {
        let header = r#"<https://example.com/n?page=3>; rel="next last""#;
        assert_eq!(parse_next_link(header).as_deref(), Some("https://example.com/n?page=3"));
    }

    #[test]
    fn test_rate_limit_from_headers() {
        let resp = response(&[
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "4990"),
            ("x-ratelimit-reset", "1714557600"),
            ("x-ratelimit-used", "10"),
        ]);
        let rate = RateLimit::from_response(&resp).unwrap();
        assert_eq!(rate.limit, 5000);
        assert_eq!(rate.remaining, 4990);
        assert_eq!(rate.used, 10);
        assert_eq!(rate.reset_at.timestamp(), 1714557600);
        assert!(!rate.is_exhausted());
    }

    #[test]
    fn test_rate_limit_missing_headers() {
        let resp = response(&[("x-ratelimit-limit", "5000")]);
        assert!(RateLimit::from_response(&resp).is_none());
    }

    #[test]
    fn test_cache_metadata() {
        let resp = response(&[("ETag", "W/\"abc\""), ("X-Poll-Interval", "90")]);
        let meta = CacheMetadata::from_response(&resp);
        assert_eq!(meta.etag.as_deref(), Some("W/\"abc\""));
        assert_eq!(meta.poll_interval_secs, Some(90));

        assert_eq!(CacheMetadata::from_response(&response(&[])), CacheMetadata::default());
    }

    #[test]
    fn test_retry_after_wins() {
        let resp = response(&[("retry-after", "120")]);
        let reset = rate_limit_reset(&resp, None).unwrap();
        let delta = (reset - Utc::now()).num_seconds();
        assert!((118..=120).contains(&delta));
    }

    #[test]
    fn test_oversized_retry_after_falls_back_to_window_reset() {
        let resp = response(&[
            ("retry-after", "100000000000000000"),
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1714557600"),
        ]);
        let rate = RateLimit::from_response(&resp).unwrap();
        let reset = rate_limit_reset(&resp, Some(&rate)).unwrap();
        assert_eq!(reset.timestamp(), 1714557600);

        let bare = response(&[("retry-after", "100000000000000000")]);
        assert!(rate_limit_reset(&bare, None).is_none());
    }
}
