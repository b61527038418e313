//! Password login with persisted lockout, gating the TOTP challenge.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::{
    error::AuthError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    state::AuthState,
    storage,
    types::{ChallengeResponse, LoginRequest},
    utils::{client_info, generate_opaque_token, verify_credential},
};
use crate::totp::repo::TotpRepo;

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Password accepted, TOTP step required", body = ChallengeResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 423, description = "Account temporarily locked"),
        (status = 429, description = "Too many attempts from this address"),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let mut violations = Vec::new();
    if request.email_or_username.trim().is_empty() {
        violations.push("emailOrUsername is required".to_string());
    }
    if request.password.is_empty() {
        violations.push("password is required".to_string());
    }
    if !violations.is_empty() {
        return Err(AuthError::Validation(violations));
    }

    let client = client_info(&headers);

    if auth_state
        .rate_limiter()
        .check_ip(client.ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    // Resolve by contact address first, display name second.
    let user = match storage::find_user_by_email(&pool, &request.email_or_username).await? {
        Some(user) => Some(user),
        None => storage::find_user_by_username(&pool, &request.email_or_username).await?,
    };

    let Some(user) = user else {
        // Same response whether the account exists or not.
        auth_state.report_failed_attempt(
            &pool,
            &request.email_or_username,
            client.ip.as_deref(),
            "invalid credentials",
        );
        return Err(AuthError::InvalidCredentials);
    };

    // Lockout applies regardless of whether this password would be correct.
    if user.is_locked {
        return Err(AuthError::AccountLocked);
    }

    if !verify_credential(&request.password, &user.password_hash) {
        let attempts = storage::record_failed_login(
            &pool,
            user.id,
            auth_state.config().max_failed_logins(),
            auth_state.config().lockout_minutes(),
        )
        .await?;
        auth_state.report_failed_attempt(
            &pool,
            &request.email_or_username,
            client.ip.as_deref(),
            "invalid credentials",
        );
        info!(user_id = %user.id, attempts, "failed password attempt recorded");
        return Err(AuthError::InvalidCredentials);
    }

    storage::reset_failed_logins(&pool, user.id).await?;

    let has_two_factor = TotpRepo::get_by_user(&pool, user.id)
        .await?
        .is_some_and(|record| record.is_enabled);

    let temp_token = generate_opaque_token()?;
    storage::insert_session(
        &pool,
        user.id,
        &temp_token,
        &client,
        auth_state.config().challenge_ttl_seconds(),
    )
    .await?;

    info!(user_id = %user.id, has_two_factor, "password accepted, challenge issued");

    Ok(Json(ChallengeResponse::new(has_two_factor, temp_token)))
}
