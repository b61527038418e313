//! Auth configuration and shared per-process state.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{
    alerts::{AttemptTracker, mask},
    rate_limit::RateLimiter,
};
use crate::{api::email::Mailer, token::TokenSigner};

const DEFAULT_MAX_FAILED_LOGINS: i32 = 5;
const DEFAULT_LOCKOUT_MINUTES: i64 = 15;
const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_ROTATION_THRESHOLD_SECONDS: i64 = 5 * 60;
const DEFAULT_TOTP_SKEW: u8 = 1;
const DEFAULT_LOGIN_RATE_LIMIT: u32 = 5;
const DEFAULT_LOGIN_RATE_WINDOW_SECONDS: u64 = 60;
const DEFAULT_EMAIL_CODE_TTL_MINUTES: i64 = 30;
const DEFAULT_RESET_CODE_TTL_MINUTES: i64 = 30;

/// Policy parameters for the auth workflows. Numeric values are deployment
/// policy, never inline literals in the handlers.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    totp_issuer: String,
    admin_email: String,
    frontend_base_url: String,
    max_failed_logins: i32,
    lockout_minutes: i64,
    challenge_ttl_seconds: i64,
    session_ttl_seconds: i64,
    rotation_threshold_seconds: i64,
    totp_skew: u8,
    login_rate_limit: u32,
    login_rate_window_seconds: u64,
    email_code_ttl_minutes: i64,
    reset_code_ttl_minutes: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(totp_issuer: String, admin_email: String, frontend_base_url: String) -> Self {
        Self {
            totp_issuer,
            admin_email,
            frontend_base_url,
            max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            rotation_threshold_seconds: DEFAULT_ROTATION_THRESHOLD_SECONDS,
            totp_skew: DEFAULT_TOTP_SKEW,
            login_rate_limit: DEFAULT_LOGIN_RATE_LIMIT,
            login_rate_window_seconds: DEFAULT_LOGIN_RATE_WINDOW_SECONDS,
            email_code_ttl_minutes: DEFAULT_EMAIL_CODE_TTL_MINUTES,
            reset_code_ttl_minutes: DEFAULT_RESET_CODE_TTL_MINUTES,
        }
    }

    #[must_use]
    pub fn with_max_failed_logins(mut self, value: i32) -> Self {
        self.max_failed_logins = value;
        self
    }

    #[must_use]
    pub fn with_lockout_minutes(mut self, value: i64) -> Self {
        self.lockout_minutes = value;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, value: i64) -> Self {
        self.challenge_ttl_seconds = value;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, value: i64) -> Self {
        self.session_ttl_seconds = value;
        self
    }

    #[must_use]
    pub fn with_rotation_threshold_seconds(mut self, value: i64) -> Self {
        self.rotation_threshold_seconds = value;
        self
    }

    #[must_use]
    pub fn with_totp_skew(mut self, value: u8) -> Self {
        self.totp_skew = value;
        self
    }

    #[must_use]
    pub fn with_login_rate_limit(mut self, limit: u32, window_seconds: u64) -> Self {
        self.login_rate_limit = limit;
        self.login_rate_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn with_email_code_ttl_minutes(mut self, value: i64) -> Self {
        self.email_code_ttl_minutes = value;
        self
    }

    #[must_use]
    pub fn with_reset_code_ttl_minutes(mut self, value: i64) -> Self {
        self.reset_code_ttl_minutes = value;
        self
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn max_failed_logins(&self) -> i32 {
        self.max_failed_logins
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }

    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn rotation_threshold_seconds(&self) -> i64 {
        self.rotation_threshold_seconds
    }

    #[must_use]
    pub fn totp_skew(&self) -> u8 {
        self.totp_skew
    }

    #[must_use]
    pub fn login_rate_limit(&self) -> u32 {
        self.login_rate_limit
    }

    #[must_use]
    pub fn login_rate_window(&self) -> Duration {
        Duration::from_secs(self.login_rate_window_seconds)
    }

    #[must_use]
    pub fn email_code_ttl_minutes(&self) -> i64 {
        self.email_code_ttl_minutes
    }

    #[must_use]
    pub fn reset_code_ttl_minutes(&self) -> i64 {
        self.reset_code_ttl_minutes
    }
}

pub struct AuthState {
    config: AuthConfig,
    signer: TokenSigner,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Mailer,
    attempts: AttemptTracker,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Mailer,
    ) -> Self {
        Self {
            config,
            signer,
            rate_limiter,
            mailer,
            attempts: AttemptTracker::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Convenience for middleware outside the auth module.
    #[must_use]
    pub fn limited(&self, ip: Option<&str>, action: super::rate_limit::RateLimitAction) -> bool {
        self.rate_limiter.check_ip(ip, action) == super::rate_limit::RateLimitDecision::Limited
    }

    #[must_use]
    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    /// Log a failed authentication attempt and raise a best-effort admin
    /// alert once the burst threshold is crossed. Never blocks the request.
    pub fn report_failed_attempt(
        &self,
        pool: &PgPool,
        identifier: &str,
        ip: Option<&str>,
        reason: &str,
    ) {
        warn!(
            identifier = %mask(identifier),
            ip = ip.unwrap_or("unknown"),
            reason,
            "login_failed"
        );

        let key = if identifier.is_empty() {
            format!("ip:{}", ip.unwrap_or("unknown"))
        } else {
            format!("u:{identifier}")
        };

        if let Some(count) = self.attempts.record_failure(&key) {
            let subject = format!("Security alert: {count} failed login attempts");
            let body = format!(
                "Detected {count} failed login attempts in the current window for {}. \
                 Review the logs and consider investigating the source address.",
                mask(identifier)
            );
            self.mailer.notify_admin(pool, subject, body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::{LogEmailSender, Mailer};
    use crate::token::TokenSigner;
    use secrecy::SecretString;

    fn state() -> AuthState {
        let config = AuthConfig::new(
            "Recinto".to_string(),
            "admin@example.com".to_string(),
            "https://recinto.dev".to_string(),
        );
        let signer = TokenSigner::new(&SecretString::from("secret"), config.session_ttl_seconds());
        let mailer = Mailer::new(
            Arc::new(LogEmailSender),
            config.admin_email().to_string(),
        );
        AuthState::new(
            config,
            signer,
            Arc::new(super::super::rate_limit::NoopRateLimiter),
            mailer,
        )
    }

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(
            "Recinto".to_string(),
            "admin@example.com".to_string(),
            "https://recinto.dev".to_string(),
        );

        assert_eq!(config.max_failed_logins(), DEFAULT_MAX_FAILED_LOGINS);
        assert_eq!(config.lockout_minutes(), DEFAULT_LOCKOUT_MINUTES);
        assert_eq!(config.challenge_ttl_seconds(), DEFAULT_CHALLENGE_TTL_SECONDS);
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.rotation_threshold_seconds(),
            DEFAULT_ROTATION_THRESHOLD_SECONDS
        );
        assert_eq!(config.totp_skew(), DEFAULT_TOTP_SKEW);

        let config = config
            .with_max_failed_logins(3)
            .with_lockout_minutes(30)
            .with_challenge_ttl_seconds(120)
            .with_session_ttl_seconds(7200)
            .with_rotation_threshold_seconds(60)
            .with_totp_skew(4)
            .with_login_rate_limit(10, 120)
            .with_email_code_ttl_minutes(5)
            .with_reset_code_ttl_minutes(10);

        assert_eq!(config.max_failed_logins(), 3);
        assert_eq!(config.lockout_minutes(), 30);
        assert_eq!(config.challenge_ttl_seconds(), 120);
        assert_eq!(config.session_ttl_seconds(), 7200);
        assert_eq!(config.rotation_threshold_seconds(), 60);
        assert_eq!(config.totp_skew(), 4);
        assert_eq!(config.login_rate_limit(), 10);
        assert_eq!(config.login_rate_window(), Duration::from_secs(120));
        assert_eq!(config.email_code_ttl_minutes(), 5);
        assert_eq!(config.reset_code_ttl_minutes(), 10);
    }

    #[test]
    fn auth_state_exposes_parts() {
        let state = state();
        assert_eq!(state.config().totp_issuer(), "Recinto");
        assert_eq!(state.signer().ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
    }
}
