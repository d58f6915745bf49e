//! Poll timing utilities
//!
//! Pure functions that can be tested without a running scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shortest sleep between polls, whatever the server advises
pub const MIN_POLL_DELAY: Duration = Duration::from_secs(1);

/// Check if enough time has elapsed since the last poll to allow a new one.
///
/// # Arguments
/// * `last_poll_at` - When the last successful poll completed (None if never polled)
/// * `cooldown_secs` - Minimum seconds that must elapse between polls
///
/// # Returns
/// `true` if enough time has passed (or never polled), `false` if still in cooldown
pub fn cooldown_elapsed(last_poll_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    match last_poll_at {
        Some(last) => {
            let elapsed = Utc::now() - last;
            elapsed.num_seconds() >= cooldown_secs as i64
        }
        None => true,
    }
}

/// How long to sleep before the next poll
///
/// Uses the server-advised interval, falling back to `default_secs`. A
/// rate-limit reset in the future pushes the next poll out until the window
/// resets.
pub fn next_poll_delay(
    advised_secs: Option<u64>,
    rate_limit_reset: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    default_secs: u64,
) -> Duration {
    let interval = Duration::from_secs(advised_secs.unwrap_or(default_secs)).max(MIN_POLL_DELAY);

    let until_reset = rate_limit_reset
        .and_then(|reset| (reset - now).to_std().ok())
        .unwrap_or_default();

    interval.max(until_reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_cooldown_elapsed_never_polled() {
        assert!(cooldown_elapsed(None, 30));
        assert!(cooldown_elapsed(None, 0));
    }

    #[test]
    fn test_cooldown_elapsed_recent_poll() {
        let last = Utc::now() - ChronoDuration::seconds(10);
        assert!(!cooldown_elapsed(Some(last), 30));
    }

    #[test]
    fn test_cooldown_elapsed_old_poll() {
        let last = Utc::now() - ChronoDuration::seconds(60);
        assert!(cooldown_elapsed(Some(last), 30));

        // Zero cooldown means always elapsed
        assert!(cooldown_elapsed(Some(Utc::now()), 0));
    }

    #[test]
    fn test_next_poll_delay_uses_advised_interval() {
        let now = Utc::now();
        assert_eq!(next_poll_delay(Some(120), None, now, 60), Duration::from_secs(120));
        assert_eq!(next_poll_delay(None, None, now, 60), Duration::from_secs(60));
    }

    #[test]
    fn test_next_poll_delay_has_floor() {
        assert_eq!(next_poll_delay(Some(0), None, Utc::now(), 60), MIN_POLL_DELAY);
    }

    #[test]
    fn test_next_poll_delay_waits_for_rate_limit_reset() {
        let now = Utc::now();
        let reset = now + ChronoDuration::minutes(12);
        assert_eq!(
            next_poll_delay(Some(60), Some(reset), now, 60),
            Duration::from_secs(12 * 60)
        );

        // A reset already in the past does not shorten or lengthen the wait
        let past = now - ChronoDuration::minutes(1);
        assert_eq!(next_poll_delay(Some(60), Some(past), now, 60), Duration::from_secs(60));
    }
}
