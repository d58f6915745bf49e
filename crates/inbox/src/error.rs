//! Error taxonomy for fetching and syncing notifications

use chrono::{DateTime, Utc};

/// Terminal failure of an API request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// 401: credentials are invalid, retrying will not help
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// 403/429: the rate limit window is exhausted
    #[error("Rate limited{}", format_reset(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Any other non-2xx status
    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    /// Transport-level failure, treated as transient
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed response body
    #[error("Failed to decode response: {0}")]
    Decoding(String),
}

fn format_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => {
            let minutes = (*at - Utc::now()).num_minutes().max(0);
            format!(", resets in {} minutes", minutes)
        }
        None => String::new(),
    }
}

impl ApiError {
    /// Whether a later attempt may succeed without user intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::RateLimited { .. } | ApiError::ServerError { .. }
        )
    }
}

/// Failure of a whole fetch cycle
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Persisting a page or the cursor failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// The blocking fetch worker panicked or was cancelled by the runtime
    #[error("Fetch worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Reset time advertised by a rate-limit failure
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncError::Api(ApiError::RateLimited { reset_at }) => *reset_at,
            _ => None,
        }
    }

    /// The token was rejected; only new credentials can fix this
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, SyncError::Api(ApiError::AuthenticationFailed))
    }

    /// Whether the next scheduled attempt may succeed on its own
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Api(e) => e.is_transient(),
            SyncError::Storage(_) | SyncError::Worker(_) => false,
        }
    }
}
