//! Error taxonomy for the auth workflows.
//!
//! Every failure surfaces as JSON `{error, details?}`. Sensitive
//! distinctions (unknown account vs. wrong password) are collapsed into a
//! single message; the unauthorized-to-register vs. duplicate-registration
//! split is intentional and carries different guidance.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Shape violations, all collected rather than first-only.
    #[error("Invalid input")]
    Validation(Vec<String>),
    /// Matricula not present in the allowlist. Registration only.
    #[error("You are not authorized to register")]
    NotAuthorized,
    /// An account already exists for this email or matricula.
    #[error("You already have an account")]
    DuplicateAccount,
    /// Display name collision; not a security event.
    #[error("Username is already taken")]
    UsernameTaken,
    /// Identical whether the account is missing or the password is wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account temporarily locked. Try later.")]
    AccountLocked,
    #[error("2FA not configured for user")]
    NotConfigured,
    #[error("2FA already enabled for this user")]
    AlreadyConfigured,
    #[error("Invalid TOTP code. Make sure you are using the current code from your authenticator app.")]
    InvalidCode,
    /// Challenge token unknown or past its expiry.
    #[error("Invalid or expired token")]
    InvalidChallengeToken,
    /// Bearer credential failed signature or expiry checks.
    #[error("Invalid token")]
    InvalidBearer,
    /// Bearer verified but no live session row backs it.
    #[error("Invalid or revoked session")]
    SessionRevoked,
    #[error("Missing authorization or userId")]
    MissingAuthorization,
    /// Protected route reached without any bearer credential.
    #[error("Unauthorized")]
    Unauthorized,
    #[error("User not found")]
    UserNotFound,
    /// Out-of-band numeric code unknown, spent, or expired.
    #[error("Invalid or expired code")]
    InvalidEmailCode,
    #[error("Invalid email or code")]
    InvalidResetRequest,
    #[error("Too many requests from this IP, please try again later.")]
    RateLimited,
    #[error("No valid refresh token. Please login again.")]
    NoRefreshToken,
    #[error("Failed to send the code by email")]
    MailFailure,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::Error::new(err).context("database error"))
    }
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::NotConfigured
            | Self::AlreadyConfigured
            | Self::InvalidEmailCode
            | Self::InvalidResetRequest => StatusCode::BAD_REQUEST,
            Self::NotAuthorized => StatusCode::FORBIDDEN,
            Self::DuplicateAccount | Self::UsernameTaken => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::InvalidCode
            | Self::InvalidChallengeToken
            | Self::InvalidBearer
            | Self::SessionRevoked
            | Self::MissingAuthorization
            | Self::Unauthorized
            | Self::NoRefreshToken => StatusCode::UNAUTHORIZED,
            Self::AccountLocked => StatusCode::LOCKED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MailFailure | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Self::Validation(details) => Json(json!({
                "error": self.to_string(),
                "details": details,
            })),
            Self::NotAuthorized => Json(json!({
                "error": self.to_string(),
                "message": "The provided matricula is not authorized. Contact the administrator.",
            })),
            Self::DuplicateAccount => Json(json!({
                "error": self.to_string(),
                "message": "This account is already registered. Please log in.",
                "redirectToLogin": true,
            })),
            Self::Internal(err) => {
                // Log the cause, never expose it.
                error!("internal error: {err:?}");
                Json(json!({ "error": self.to_string() }))
            }
            _ => Json(json!({ "error": self.to_string() })),
        };

        (status, body).into_response()
    }
}
