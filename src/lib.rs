//! # Recinto (Campus Authentication Backend)
//!
//! `recinto` is the authentication authority for the campus micro-site.
//! Account creation is gated by a pre-authorized allowlist keyed on the
//! institutional enrollment id (matricula); every account must complete
//! TOTP two-factor enrollment before it obtains a full session.
//!
//! ## Flows
//!
//! - **Registration**: allowlist check by matricula, duplicate detection,
//!   account created inactive, client continues straight into 2FA setup.
//! - **Login**: password check with persisted failed-attempt lockout,
//!   then a short-lived challenge token gating the TOTP step.
//! - **TOTP verify**: first successful code activates the credential and
//!   every success mints a signed bearer token backed by a session row,
//!   so tokens can be revoked server-side despite looking stateless.
//!
//! ## Concurrency
//!
//! All cross-request state lives in Postgres. The designed-for races are
//! resolved by constraint discipline: the unique index on
//! `two_factor_auth.user_id` turns concurrent setup calls into an
//! idempotent reuse branch, failed-login lockout is a single atomic
//! read-modify-write, and backup codes are consumed with an atomic
//! check-and-remove.

pub mod api;
pub mod cli;
pub mod token;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
