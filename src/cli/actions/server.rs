use crate::{api, cli::commands::auth};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = api::handlers::auth::AuthConfig::new(
        args.auth.totp_issuer,
        args.auth.admin_email,
        args.auth.frontend_base_url,
    )
    .with_max_failed_logins(args.auth.max_failed_logins)
    .with_lockout_minutes(args.auth.lockout_minutes)
    .with_challenge_ttl_seconds(args.auth.challenge_ttl_seconds)
    .with_session_ttl_seconds(args.auth.session_ttl_seconds)
    .with_rotation_threshold_seconds(args.auth.rotation_threshold_seconds)
    .with_totp_skew(args.auth.totp_skew)
    .with_login_rate_limit(args.auth.login_rate_limit, args.auth.login_rate_window_seconds)
    .with_email_code_ttl_minutes(args.auth.email_code_ttl_minutes)
    .with_reset_code_ttl_minutes(args.auth.reset_code_ttl_minutes);

    api::new(args.port, args.dsn, args.auth.jwt_secret, auth_config).await
}
