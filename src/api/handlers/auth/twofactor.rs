//! TOTP setup and verification endpoints.
//!
//! Both accept either a direct `userId` (the fresh-registration path) or a
//! bearer challenge token from login. Setup is idempotent under concurrent
//! duplicate calls; verification activates the credential on first success
//! and exchanges the challenge token for a full session.

use axum::{Json, extract::Extension, http::HeaderMap, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    state::AuthState,
    storage::{self, UserRecord},
    types::{
        SetupTwoFactorRequest, SetupTwoFactorResponse, UserView, VerifyTwoFactorRequest,
        VerifyTwoFactorResponse,
    },
    utils::{client_info, extract_bearer_token},
};
use crate::totp::{SetupOutcome, TotpService, VerifyOutcome};

/// Resolve the target account from a direct id or a challenge token.
async fn resolve_account(
    pool: &PgPool,
    user_id: Option<&str>,
    bearer: Option<&str>,
) -> Result<(UserRecord, Option<Uuid>), AuthError> {
    if let Some(raw_id) = user_id {
        let Ok(id) = Uuid::parse_str(raw_id) else {
            return Err(AuthError::UserNotFound);
        };
        let user = storage::find_user_by_id(pool, id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        return Ok((user, None));
    }

    let Some(token) = bearer else {
        return Err(AuthError::MissingAuthorization);
    };
    let session = storage::lookup_session(pool, token)
        .await?
        .ok_or(AuthError::InvalidChallengeToken)?;
    let user = storage::find_user_by_id(pool, session.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok((user, Some(session.id)))
}

#[utoipa::path(
    post,
    path = "/auth/setup-2fa",
    request_body = SetupTwoFactorRequest,
    responses(
        (status = 200, description = "QR artifact; backup codes only on first creation", body = SetupTwoFactorResponse),
        (status = 400, description = "2FA already enabled"),
        (status = 401, description = "Missing or expired token"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "auth"
)]
pub async fn setup_2fa(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    totp_service: Extension<TotpService>,
    payload: Option<Json<SetupTwoFactorRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    let bearer = extract_bearer_token(&headers);
    let (user, _) = resolve_account(&pool, request.user_id.as_deref(), bearer.as_deref()).await?;

    match totp_service.setup(user.id, &user.username).await? {
        SetupOutcome::AlreadyEnabled => Err(AuthError::AlreadyConfigured),
        SetupOutcome::Reused { qr } => {
            // Backup codes were issued once at creation and exist only as
            // hashes now; an empty list tells the client "already issued".
            info!(user_id = %user.id, "two-factor setup reused pending secret");
            Ok(Json(SetupTwoFactorResponse {
                qr,
                backup_codes: Vec::new(),
            }))
        }
        SetupOutcome::Created { qr, backup_codes } => {
            info!(user_id = %user.id, "two-factor setup created new secret");
            Ok(Json(SetupTwoFactorResponse { qr, backup_codes }))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/verify-2fa",
    request_body = VerifyTwoFactorRequest,
    responses(
        (status = 200, description = "Code accepted, full session issued", body = VerifyTwoFactorResponse),
        (status = 400, description = "2FA not configured or bad request shape"),
        (status = 401, description = "Invalid or expired token or code"),
        (status = 404, description = "Unknown user"),
    ),
    tag = "auth"
)]
pub async fn verify_2fa(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    totp_service: Extension<TotpService>,
    payload: Option<Json<VerifyTwoFactorRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let violations = validate(&request);
    if !violations.is_empty() {
        return Err(AuthError::Validation(violations));
    }

    let client = client_info(&headers);

    let (user, challenge_session_id) = resolve_account(
        &pool,
        request.user_id.as_deref(),
        request.temp_token.as_deref(),
    )
    .await?;

    let outcome = if let Some(code) = request.totp_code.as_deref() {
        totp_service.verify(user.id, code).await?
    } else if let Some(code) = request.backup_code.as_deref() {
        totp_service.redeem_backup(user.id, code).await?
    } else {
        return Err(AuthError::Validation(vec![
            "Either totpCode or backupCode is required".to_string(),
        ]));
    };

    match outcome {
        VerifyOutcome::NotConfigured => return Err(AuthError::NotConfigured),
        VerifyOutcome::Invalid => {
            auth_state.report_failed_attempt(
                &pool,
                &user.email,
                client.ip.as_deref(),
                "invalid totp",
            );
            return Err(AuthError::InvalidCode);
        }
        VerifyOutcome::Valid { activated } => {
            if activated {
                info!(user_id = %user.id, "two-factor enabled on first verification");
            }
        }
    }

    let token = auth_state
        .signer()
        .sign(user.id, &user.email, &user.username)
        .map_err(|err| AuthError::Internal(anyhow::Error::new(err)))?;

    storage::insert_session(
        &pool,
        user.id,
        &token,
        &client,
        auth_state.config().session_ttl_seconds(),
    )
    .await?;

    // Challenge tokens are single-use. Removal failure is logged but does
    // not fail the request: the row expires on its own shortly.
    if let Some(session_id) = challenge_session_id {
        if let Err(err) = storage::delete_session(&pool, session_id).await {
            warn!("could not delete challenge session: {err}");
        }
    }

    info!(user_id = %user.id, "two-factor verification succeeded, session issued");

    Ok(Json(VerifyTwoFactorResponse {
        token,
        user: UserView {
            id: user.id.to_string(),
            email: user.email,
            username: user.username,
        },
    }))
}

fn validate(request: &VerifyTwoFactorRequest) -> Vec<String> {
    let mut violations = Vec::new();

    if request.temp_token.is_none() && request.user_id.is_none() {
        violations.push("Either tempToken or userId is required".to_string());
    }

    match (request.totp_code.as_deref(), request.backup_code.as_deref()) {
        (None, None) => {
            violations.push("Either totpCode or backupCode is required".to_string());
        }
        (Some(code), _) => {
            if code.len() != 6 || !code.chars().all(|ch| ch.is_ascii_digit()) {
                violations.push("totpCode must be 6 digits".to_string());
            }
        }
        (None, Some(_)) => {}
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::api::handlers::auth::types::VerifyTwoFactorRequest;

    fn request(
        temp_token: Option<&str>,
        user_id: Option<&str>,
        totp_code: Option<&str>,
        backup_code: Option<&str>,
    ) -> VerifyTwoFactorRequest {
        VerifyTwoFactorRequest {
            temp_token: temp_token.map(str::to_string),
            user_id: user_id.map(str::to_string),
            totp_code: totp_code.map(str::to_string),
            backup_code: backup_code.map(str::to_string),
        }
    }

    #[test]
    fn accepts_user_id_with_totp_code() {
        let violations = validate(&request(None, Some("u-1"), Some("123456"), None));
        assert!(violations.is_empty());
    }

    #[test]
    fn accepts_temp_token_with_backup_code() {
        let violations = validate(&request(Some("tok"), None, None, Some("abcd1234")));
        assert!(violations.is_empty());
    }

    #[test]
    fn requires_an_identifier() {
        let violations = validate(&request(None, None, Some("123456"), None));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn requires_a_code() {
        let violations = validate(&request(Some("tok"), None, None, None));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn totp_code_shape_enforced() {
        assert!(!validate(&request(Some("tok"), None, Some("12345"), None)).is_empty());
        assert!(!validate(&request(Some("tok"), None, Some("12345a"), None)).is_empty());
        assert!(!validate(&request(Some("tok"), None, Some("1234567"), None)).is_empty());
    }
}
