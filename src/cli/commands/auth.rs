use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_policy_args(command);
    with_mail_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("HMAC secret used to sign bearer tokens")
                .env("RECINTO_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer shown in authenticator apps")
                .env("RECINTO_TOTP_ISSUER")
                .default_value("Recinto"),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL allowed by CORS")
                .env("RECINTO_FRONTEND_BASE_URL")
                .default_value("https://recinto.dev"),
        )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("max-failed-logins")
                .long("max-failed-logins")
                .help("Failed password attempts before a temporary lockout")
                .env("RECINTO_MAX_FAILED_LOGINS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("lockout-minutes")
                .long("lockout-minutes")
                .help("Lockout duration after too many failed logins")
                .env("RECINTO_LOCKOUT_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("challenge-ttl-seconds")
                .long("challenge-ttl-seconds")
                .help("TTL of the challenge token issued between password and TOTP checks")
                .env("RECINTO_CHALLENGE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("TTL of a full authenticated session")
                .env("RECINTO_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("rotation-threshold-seconds")
                .long("rotation-threshold-seconds")
                .help("Remaining validity below which bearer tokens are rotated in place")
                .env("RECINTO_ROTATION_THRESHOLD_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("totp-skew")
                .long("totp-skew")
                .help("Accepted TOTP steps before/after the current one (each step widens the brute-force surface)")
                .env("RECINTO_TOTP_SKEW")
                .default_value("1")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("login-rate-limit")
                .long("login-rate-limit")
                .help("Login attempts allowed per source address per window")
                .env("RECINTO_LOGIN_RATE_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("login-rate-window-seconds")
                .long("login-rate-window-seconds")
                .help("Window for the per-address login rate limit")
                .env("RECINTO_LOGIN_RATE_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_mail_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("admin-email")
                .long("admin-email")
                .help("Recipient of registration and security alerts")
                .env("RECINTO_ADMIN_EMAIL")
                .default_value("admin@example.com"),
        )
        .arg(
            Arg::new("email-code-ttl-minutes")
                .long("email-code-ttl-minutes")
                .help("TTL of out-of-band email verification codes")
                .env("RECINTO_EMAIL_CODE_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-code-ttl-minutes")
                .long("reset-code-ttl-minutes")
                .help("TTL of password reset codes")
                .env("RECINTO_RESET_CODE_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
}

/// Parsed auth-related CLI options.
#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub totp_issuer: String,
    pub frontend_base_url: String,
    pub admin_email: String,
    pub max_failed_logins: i32,
    pub lockout_minutes: i64,
    pub challenge_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub rotation_threshold_seconds: i64,
    pub totp_skew: u8,
    pub login_rate_limit: u32,
    pub login_rate_window_seconds: u64,
    pub email_code_ttl_minutes: i64,
    pub reset_code_ttl_minutes: i64,
}

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>("jwt-secret")
            .cloned()
            .context("missing required argument: --jwt-secret")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            totp_issuer: arg_string(matches, "totp-issuer"),
            frontend_base_url: arg_string(matches, "frontend-base-url"),
            admin_email: arg_string(matches, "admin-email"),
            max_failed_logins: arg_copied(matches, "max-failed-logins", 5),
            lockout_minutes: arg_copied(matches, "lockout-minutes", 15),
            challenge_ttl_seconds: arg_copied(matches, "challenge-ttl-seconds", 600),
            session_ttl_seconds: arg_copied(matches, "session-ttl-seconds", 3600),
            rotation_threshold_seconds: arg_copied(matches, "rotation-threshold-seconds", 300),
            totp_skew: arg_copied(matches, "totp-skew", 1),
            login_rate_limit: arg_copied(matches, "login-rate-limit", 5),
            login_rate_window_seconds: arg_copied(matches, "login-rate-window-seconds", 60),
            email_code_ttl_minutes: arg_copied(matches, "email-code-ttl-minutes", 30),
            reset_code_ttl_minutes: arg_copied(matches, "reset-code-ttl-minutes", 30),
        })
    }
}

fn arg_string(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

fn arg_copied<T: Copy + Send + Sync + 'static>(matches: &ArgMatches, name: &str, default: T) -> T {
    matches.get_one::<T>(name).copied().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::Options;
    use secrecy::ExposeSecret;

    #[test]
    fn parse_defaults() {
        temp_env::with_vars_unset(
            [
                "RECINTO_MAX_FAILED_LOGINS",
                "RECINTO_LOCKOUT_MINUTES",
                "RECINTO_TOTP_SKEW",
                "RECINTO_JWT_SECRET",
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "recinto",
                    "--dsn",
                    "postgres://localhost/recinto",
                    "--jwt-secret",
                    "s3cret",
                ]);
                let options = Options::parse(&matches).expect("options should parse");

                assert_eq!(options.jwt_secret.expose_secret(), "s3cret");
                assert_eq!(options.totp_issuer, "Recinto");
                assert_eq!(options.max_failed_logins, 5);
                assert_eq!(options.lockout_minutes, 15);
                assert_eq!(options.challenge_ttl_seconds, 600);
                assert_eq!(options.session_ttl_seconds, 3600);
                assert_eq!(options.rotation_threshold_seconds, 300);
                assert_eq!(options.totp_skew, 1);
                assert_eq!(options.login_rate_limit, 5);
                assert_eq!(options.login_rate_window_seconds, 60);
            },
        );
    }

    #[test]
    fn parse_overrides() {
        let command = crate::cli::commands::new();
        let matches = command.get_matches_from(vec![
            "recinto",
            "--dsn",
            "postgres://localhost/recinto",
            "--jwt-secret",
            "s3cret",
            "--max-failed-logins",
            "3",
            "--lockout-minutes",
            "30",
            "--totp-skew",
            "10",
            "--admin-email",
            "soc@campus.mx",
        ]);
        let options = Options::parse(&matches).expect("options should parse");

        assert_eq!(options.max_failed_logins, 3);
        assert_eq!(options.lockout_minutes, 30);
        assert_eq!(options.totp_skew, 10);
        assert_eq!(options.admin_email, "soc@campus.mx");
    }
}
