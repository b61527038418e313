//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action,
//! such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth: auth_opts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_builds_server_action() {
        temp_env::with_vars_unset(["RECINTO_PORT", "RECINTO_DSN", "RECINTO_JWT_SECRET"], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "recinto",
                "--dsn",
                "postgres://user@localhost:5432/recinto",
                "--jwt-secret",
                "s3cret",
                "--port",
                "9000",
            ]);
            let action = handler(&matches).expect("handler should succeed");
            let Action::Server(args) = action;
            assert_eq!(args.port, 9000);
            assert_eq!(args.dsn, "postgres://user@localhost:5432/recinto");
            assert_eq!(args.auth.totp_issuer, "Recinto");
        });
    }
}
