//! Failed-login tracking for administrative alerting.
//!
//! This is an observability side-channel, not an enforcement mechanism:
//! the lockout that actually blocks logins is persisted per account in the
//! database. Counters here are in-memory, restart-tolerant only in the
//! sense that losing them merely delays an alert.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_ALERT_THRESHOLD: usize = 10;
const DEFAULT_ALERT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Sliding-window counter of failed attempts keyed by identifier or address.
#[derive(Debug)]
pub struct AttemptTracker {
    threshold: usize,
    window: Duration,
    failures: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD, DEFAULT_ALERT_WINDOW)
    }
}

impl AttemptTracker {
    #[must_use]
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            threshold,
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record one failure. Returns the count when the threshold is crossed,
    /// clearing the bucket so the same burst does not alert twice.
    pub fn record_failure(&self, key: &str) -> Option<usize> {
        let now = Instant::now();
        let Ok(mut failures) = self.failures.lock() else {
            return None;
        };

        let attempts = failures.entry(key.to_string()).or_default();
        attempts.push(now);
        let window = self.window;
        attempts.retain(|ts| now.duration_since(*ts) < window);

        if attempts.len() >= self.threshold {
            let count = attempts.len();
            attempts.clear();
            Some(count)
        } else {
            None
        }
    }
}

/// Mask an identifier for logs: first and last characters survive.
#[must_use]
pub fn mask(identifier: &str) -> String {
    let chars: Vec<char> = identifier.chars().collect();
    if chars.len() <= 2 {
        return "*".repeat(chars.len());
    }
    let mut masked = String::new();
    masked.push(chars[0]);
    masked.push_str(&"*".repeat(chars.len().saturating_sub(2).max(1)));
    masked.push(chars[chars.len() - 1]);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossing_reports_once() {
        let tracker = AttemptTracker::new(3, Duration::from_secs(60));
        assert_eq!(tracker.record_failure("u:alice"), None);
        assert_eq!(tracker.record_failure("u:alice"), None);
        assert_eq!(tracker.record_failure("u:alice"), Some(3));
        // Bucket was cleared; the count restarts.
        assert_eq!(tracker.record_failure("u:alice"), None);
    }

    #[test]
    fn separate_keys_do_not_interact() {
        let tracker = AttemptTracker::new(2, Duration::from_secs(60));
        assert_eq!(tracker.record_failure("u:alice"), None);
        assert_eq!(tracker.record_failure("ip:1.2.3.4"), None);
        assert_eq!(tracker.record_failure("u:alice"), Some(2));
    }

    #[test]
    fn old_failures_age_out() {
        let tracker = AttemptTracker::new(2, Duration::from_millis(10));
        assert_eq!(tracker.record_failure("u:alice"), None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tracker.record_failure("u:alice"), None);
    }

    #[test]
    fn mask_keeps_ends_only() {
        assert_eq!(mask("alice"), "a***e");
        assert_eq!(mask("ab"), "**");
        assert_eq!(mask(""), "");
        assert_eq!(mask("abc"), "a*c");
    }
}
