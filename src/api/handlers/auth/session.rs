//! Bearer-guarded endpoints and transparent token rotation.
//!
//! A bearer token is only honored when its signature verifies AND a live
//! session row still backs it, so sessions can be revoked server-side.
//! Tokens close to expiry are replaced in place and surfaced through the
//! `x-refresh-token` response header, keeping active users logged in while
//! idle sessions still expire.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    state::AuthState,
    storage,
    types::{MeResponse, MessageResponse, ProfileView},
    utils::extract_bearer_token,
};

const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";
const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Outcome of a successful bearer check.
pub(crate) struct AuthedRequest {
    pub(crate) user_id: Uuid,
    pub(crate) rotated_token: Option<String>,
}

/// Validate the bearer credential and its backing session, rotating the
/// token when its remaining validity drops below the threshold.
pub(crate) async fn authenticate_bearer(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<AuthedRequest, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthorized)?;

    let claims = auth_state
        .signer()
        .verify(&token)
        .map_err(|_| AuthError::InvalidBearer)?;

    let session = storage::lookup_session(pool, &token)
        .await?
        .ok_or(AuthError::SessionRevoked)?;

    let mut rotated_token = None;
    let remaining = claims.seconds_remaining();
    if remaining > 0 && remaining < auth_state.config().rotation_threshold_seconds() {
        // Rotation failures are non-fatal; the current token still works.
        match auth_state
            .signer()
            .sign(session.user_id, &claims.email, &claims.username)
        {
            Ok(new_token) => {
                match storage::rotate_session(
                    pool,
                    session.id,
                    &new_token,
                    auth_state.config().session_ttl_seconds(),
                )
                .await
                {
                    Ok(()) => {
                        info!(user_id = %session.user_id, "session token rotated");
                        rotated_token = Some(new_token);
                    }
                    Err(err) => warn!("failed to rotate token: {err}"),
                }
            }
            Err(err) => warn!("failed to sign rotated token: {err}"),
        }
    }

    Ok(AuthedRequest {
        user_id: session.user_id,
        rotated_token,
    })
}

fn rotation_headers(rotated_token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = rotated_token {
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert(REFRESH_TOKEN_HEADER, value);
        }
    }
    headers
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Missing, invalid or revoked credential"),
        (status = 404, description = "Account no longer exists"),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let authed = authenticate_bearer(&headers, &pool, &auth_state).await?;

    let profile = storage::find_profile(&pool, authed.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let response_headers = rotation_headers(authed.rotated_token.as_deref());

    Ok((
        response_headers,
        Json(MeResponse {
            user: ProfileView {
                id: profile.id.to_string(),
                email: profile.email,
                name: profile.username.clone(),
                username: profile.username,
                is_active: profile.is_active,
                created_at: profile.created_at,
            },
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 401, description = "No valid refresh token"),
    ),
    tag = "auth"
)]
pub async fn refresh() -> Result<Json<MessageResponse>, AuthError> {
    // Refresh cookies are never issued; the endpoint exists for wire
    // compatibility and always asks the client to log in again.
    Err(AuthError::NoRefreshToken)
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    if let Some(token) = extract_bearer_token(&headers) {
        if let Err(err) = storage::delete_session_by_token(&pool, &token).await {
            warn!("failed to delete session on logout: {err}");
        }
    }

    // Clear the legacy refresh cookie either way.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
    )) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    (
        response_headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::rotation_headers;

    #[test]
    fn rotation_header_present_only_when_rotated() {
        let headers = rotation_headers(None);
        assert!(headers.get("x-refresh-token").is_none());

        let headers = rotation_headers(Some("new-token"));
        assert_eq!(
            headers
                .get("x-refresh-token")
                .and_then(|value| value.to_str().ok()),
            Some("new-token")
        );
    }
}
