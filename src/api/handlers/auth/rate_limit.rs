//! Rate limiting primitives for auth flows.
//!
//! Limiters are best-effort, per-process protection; the security-enforcing
//! lockout lives in the database (see the login workflow).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    General,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Fixed-window counter per source address and action.
#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    login: Window,
    general: Window,
}

#[derive(Debug)]
struct Window {
    limit: u32,
    length: Duration,
    hits: Mutex<HashMap<String, (Instant, u32)>>,
}

impl Window {
    fn new(limit: u32, length: Duration) -> Self {
        Self {
            limit,
            length,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut hits) = self.hits.lock() else {
            return RateLimitDecision::Allowed;
        };

        // Bound memory: drop finished windows once the map grows.
        if hits.len() > 10_000 {
            let length = self.length;
            hits.retain(|_, (start, _)| now.duration_since(*start) < length);
        }

        let entry = hits.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.length {
            *entry = (now, 0);
        }
        entry.1 += 1;

        if entry.1 > self.limit {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl FixedWindowRateLimiter {
    /// `login_limit` per `login_window` for the login endpoint; the general
    /// ceiling is the coarse whole-API limit.
    #[must_use]
    pub fn new(
        login_limit: u32,
        login_window: Duration,
        general_limit: u32,
        general_window: Duration,
    ) -> Self {
        Self {
            login: Window::new(login_limit, login_window),
            general: Window::new(general_limit, general_window),
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        let key = ip.unwrap_or("unknown");
        match action {
            RateLimitAction::Login => self.login.check(key),
            RateLimitAction::General => self.general.check(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::General),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn login_limit_blocks_sixth_attempt() {
        let limiter =
            FixedWindowRateLimiter::new(5, Duration::from_secs(60), 1000, Duration::from_secs(900));
        for _ in 0..5 {
            assert_eq!(
                limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn limits_are_per_address() {
        let limiter =
            FixedWindowRateLimiter::new(1, Duration::from_secs(60), 1000, Duration::from_secs(900));
        assert_eq!(
            limiter.check_ip(Some("1.1.1.1"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("2.2.2.2"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.1.1.1"), RateLimitAction::Login),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowRateLimiter::new(
            1,
            Duration::from_millis(20),
            1000,
            Duration::from_secs(900),
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn missing_address_shares_one_bucket() {
        let limiter =
            FixedWindowRateLimiter::new(1, Duration::from_secs(60), 1000, Duration::from_secs(900));
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Login),
            RateLimitDecision::Limited
        );
    }
}
