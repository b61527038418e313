//! Authentication workflows.
//!
//! Flow overview:
//! 1) Registration checks the allowlist, creates an inactive account and
//!    sends the client straight into two-factor setup.
//! 2) Login verifies the password under the persisted lockout policy and
//!    issues a short-lived challenge token.
//! 3) TOTP verification exchanges the challenge token (single use) for a
//!    signed bearer credential backed by a session row.
//!
//! Security boundaries:
//! - Account-existence information never leaks through login, forgot
//!   password or email verification responses.
//! - Lockout counters are persisted per account; in-memory state is only
//!   used for best-effort rate limiting and alerting.

pub mod alerts;
pub mod error;
pub mod login;
pub mod password;
pub mod rate_limit;
pub mod register;
pub mod session;
pub mod state;
pub(crate) mod storage;
pub mod twofactor;
pub mod types;
pub(crate) mod utils;

pub use error::AuthError;
pub use rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimitAction, RateLimiter};
pub use state::{AuthConfig, AuthState};
