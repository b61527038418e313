//! Out-of-band numeric codes: email verification and password reset.
//!
//! Forgot-password deliberately answers the same way whether or not the
//! address has an account.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use regex::Regex;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{
    error::AuthError,
    state::AuthState,
    storage,
    types::{
        ChallengeResponse, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
        SendEmailCodeRequest, SendEmailCodeResponse, VerifyEmailRequest,
    },
    utils::{client_info, generate_numeric_code, generate_opaque_token, hash_credential},
};
use crate::totp::repo::TotpRepo;

const RESET_PASSWORD_MIN: usize = 12;

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

fn valid_code_shape(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|ch| ch.is_ascii_digit())
}

/// Reset keeps a stricter policy than registration: longer minimum and a
/// mandatory special character.
fn reset_password_violations(password: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if password.chars().count() < RESET_PASSWORD_MIN {
        violations.push(format!(
            "newPassword must be at least {RESET_PASSWORD_MIN} characters"
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("newPassword must contain an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("newPassword must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        violations.push("newPassword must contain a digit".to_string());
    }
    if password.chars().all(char::is_alphanumeric) {
        violations.push("newPassword must contain a special character".to_string());
    }
    violations
}

#[utoipa::path(
    post,
    path = "/auth/send-email-code",
    request_body = SendEmailCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = SendEmailCodeResponse),
        (status = 404, description = "Unknown user"),
        (status = 500, description = "Mail delivery failed"),
    ),
    tag = "auth"
)]
pub async fn send_email_code(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SendEmailCodeRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let Ok(user_id) = Uuid::parse_str(&request.user_id) else {
        return Err(AuthError::UserNotFound);
    };
    let user = storage::find_user_by_id(&pool, user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let code = generate_numeric_code();
    storage::upsert_email_code(
        &pool,
        user.id,
        &code,
        auth_state.config().email_code_ttl_minutes(),
    )
    .await?;

    if let Err(err) = auth_state.mailer().send_code(&pool, &user.email, &code).await {
        info!(user_id = %user.id, "verification code delivery failed: {err}");
        return Err(AuthError::MailFailure);
    }

    info!(user_id = %user.id, "verification code sent");

    Ok(Json(SendEmailCodeResponse {
        message: "Code sent to your email".to_string(),
        email: user.email,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Code accepted, TOTP step follows", body = ChallengeResponse),
        (status = 400, description = "Invalid or expired code"),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let mut violations = Vec::new();
    if !valid_email(&request.email) {
        violations.push("email must be a valid address".to_string());
    }
    if !valid_code_shape(&request.code) {
        violations.push("code must be 6 digits".to_string());
    }
    if !violations.is_empty() {
        return Err(AuthError::Validation(violations));
    }

    // Unknown address and wrong code answer identically.
    let Some(user) = storage::find_user_by_email(&pool, &request.email).await? else {
        return Err(AuthError::InvalidEmailCode);
    };

    if !storage::take_email_code(&pool, user.id, &request.code).await? {
        return Err(AuthError::InvalidEmailCode);
    }

    let has_two_factor = TotpRepo::get_by_user(&pool, user.id)
        .await?
        .is_some_and(|record| record.is_enabled);

    let client = client_info(&headers);
    let temp_token = generate_opaque_token()?;
    storage::insert_session(
        &pool,
        user.id,
        &temp_token,
        &client,
        auth_state.config().challenge_ttl_seconds(),
    )
    .await?;

    info!(user_id = %user.id, "email code accepted, challenge issued");

    Ok(Json(ChallengeResponse::new(has_two_factor, temp_token)))
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic acknowledgement, never reveals account existence", body = MessageResponse),
        (status = 400, description = "Malformed email"),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    if !valid_email(&request.email) {
        return Err(AuthError::Validation(vec![
            "email must be a valid address".to_string(),
        ]));
    }

    // The response below is fixed before we know whether the account exists.
    if let Some(user) = storage::find_user_by_email(&pool, &request.email).await? {
        let code = generate_numeric_code();
        storage::insert_reset_code(
            &pool,
            user.id,
            &code,
            auth_state.config().reset_code_ttl_minutes(),
        )
        .await?;

        if let Err(err) = auth_state.mailer().send_code(&pool, &user.email, &code).await {
            // Do not leak delivery problems either.
            info!(user_id = %user.id, "reset code delivery failed: {err}");
        } else {
            info!(user_id = %user.id, "password reset code generated");
        }
    }

    Ok(Json(MessageResponse {
        message: "If the email exists, you will receive a recovery code".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid code or password"),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let mut violations = Vec::new();
    if !valid_email(&request.email) {
        violations.push("email must be a valid address".to_string());
    }
    if !valid_code_shape(&request.code) {
        violations.push("code must be 6 digits".to_string());
    }
    violations.extend(reset_password_violations(&request.new_password));
    if !violations.is_empty() {
        return Err(AuthError::Validation(violations));
    }

    let Some(user) = storage::find_user_by_email(&pool, &request.email).await? else {
        return Err(AuthError::InvalidResetRequest);
    };

    if !storage::consume_reset_code(&pool, user.id, &request.code).await? {
        return Err(AuthError::InvalidEmailCode);
    }

    let password_hash = hash_credential(&request.new_password)?;
    storage::update_password(&pool, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password reset successful");

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::{reset_password_violations, valid_code_shape, valid_email};

    #[test]
    fn email_shape() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn code_shape() {
        assert!(valid_code_shape("012345"));
        assert!(!valid_code_shape("12345"));
        assert!(!valid_code_shape("1234567"));
        assert!(!valid_code_shape("12345a"));
    }

    #[test]
    fn reset_policy_is_stricter_than_registration() {
        assert!(reset_password_violations("Abcdef123!xy").is_empty());
        // Ten characters pass registration but not reset.
        assert!(!reset_password_violations("Abcdefg123").is_empty());
        assert!(!reset_password_violations("abcdefgh123!").is_empty()); // no uppercase
        assert!(!reset_password_violations("Abcdefghijk!").is_empty()); // no digit
        assert!(!reset_password_violations("Abcdefgh1234").is_empty()); // no special
    }
}
