//! Registration gated by the pre-authorized allowlist.
//!
//! The caller never supplies an email: the contact address always comes
//! from the matched allowlist row, so a stolen matricula cannot redirect
//! the account to an attacker's mailbox.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse};
use regex::Regex;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use super::{
    error::AuthError,
    state::AuthState,
    storage::{
        self, InsertUserOutcome,
    },
    types::{RegisterRequest, RegisterResponse},
    utils::{client_info, hash_credential},
};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 25;
const PASSWORD_MIN: usize = 10;
const PASSWORD_FORBIDDEN: &[char] = &['(', ')', '¨', '"', '!', '/', '=', '?', '¡'];

/// Shape-check the request, collecting every violation rather than
/// stopping at the first.
fn validate(request: &RegisterRequest) -> Vec<String> {
    let mut violations = Vec::new();

    let matricula_ok = Regex::new(r"^[A-Za-z]{2}[0-9]{11}$")
        .is_ok_and(|regex| regex.is_match(&request.matricula));
    if !matricula_ok {
        violations
            .push("matricula must be 2 letters followed by 11 digits (13 characters)".to_string());
    }

    let username_len = request.username.chars().count();
    if username_len < USERNAME_MIN || username_len > USERNAME_MAX {
        violations.push(format!(
            "username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        ));
    }

    violations.extend(password_violations(&request.password));

    if request.confirm_password != request.password {
        violations.push("confirmPassword must match password".to_string());
    }

    if !request.accept_terms {
        violations.push("acceptTerms must be true".to_string());
    }

    violations
}

fn password_violations(password: &str) -> Vec<String> {
    let mut violations = Vec::new();
    if password.chars().count() < PASSWORD_MIN {
        violations.push(format!("password must be at least {PASSWORD_MIN} characters"));
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        violations.push("password must contain a digit".to_string());
    }
    if password.chars().any(|ch| PASSWORD_FORBIDDEN.contains(&ch)) {
        violations.push(r#"password must not contain: ( ) ¨ " ! / = ? ¡"#.to_string());
    }
    violations
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful, 2FA setup required", body = RegisterResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Matricula not in the allowlist"),
        (status = 409, description = "Account or username already exists"),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation(vec!["Missing payload".to_string()]));
    };

    let violations = validate(&request);
    if !violations.is_empty() {
        return Err(AuthError::Validation(violations));
    }

    let client = client_info(&headers);

    // Allowlist membership decides everything; the caller learns only that
    // it was rejected, not whether the matricula is unknown or blocked.
    let Some(authorized) =
        storage::find_authorized_by_matricula(&pool, &request.matricula).await?
    else {
        warn!(matricula = %request.matricula, "registration attempt with unauthorized matricula");
        auth_state.mailer().notify_admin(
            &pool,
            "Unauthorized registration attempt".to_string(),
            format!(
                "matricula: {}\nusername: {}\nsource address: {}\nunix time: {}",
                request.matricula,
                request.username,
                client.ip.as_deref().unwrap_or("unknown"),
                unix_now(),
            ),
        );
        return Err(AuthError::NotAuthorized);
    };

    // The address on file wins over anything the caller could claim.
    let email = authorized.email;

    let (by_email, by_matricula, by_username) = tokio::try_join!(
        storage::find_user_by_email(&pool, &email),
        storage::find_user_by_matricula(&pool, &request.matricula),
        storage::find_user_by_username(&pool, &request.username),
    )?;

    if let Some(existing) = by_email.as_ref().or(by_matricula.as_ref()) {
        warn!(matricula = %request.matricula, "registration attempt for existing account");
        auth_state.mailer().notify_admin(
            &pool,
            "Duplicate registration attempt".to_string(),
            format!(
                "matricula: {}\nexisting username: {}\nsource address: {}\nunix time: {}",
                request.matricula,
                existing.username,
                client.ip.as_deref().unwrap_or("unknown"),
                unix_now(),
            ),
        );
        return Err(AuthError::DuplicateAccount);
    }

    if by_username.is_some() {
        return Err(AuthError::UsernameTaken);
    }

    let password_hash = hash_credential(&request.password)?;

    let user_id = match storage::insert_user(
        &pool,
        &request.matricula,
        &email,
        &request.username,
        &password_hash,
    )
    .await?
    {
        InsertUserOutcome::Created(id) => id,
        // A concurrent registration won between the pre-checks and the
        // insert; the constraint is the authority.
        InsertUserOutcome::Conflict => return Err(AuthError::DuplicateAccount),
    };

    auth_state.mailer().notify_admin(
        &pool,
        "New registration".to_string(),
        format!(
            "matricula: {}\nemail: {}\nusername: {}",
            request.matricula, email, request.username
        ),
    );

    info!(%user_id, username = %request.username, "new user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            requires_google_auth_setup: true,
            user_id: user_id.to_string(),
            message: "Registration successful. Set up your two-factor authentication.".to_string(),
            email,
        }),
    ))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::{password_violations, validate};
    use crate::api::handlers::auth::types::RegisterRequest;

    fn valid_request() -> RegisterRequest {
        RegisterRequest {
            matricula: "AB12345678901".to_string(),
            username: "alice".to_string(),
            password: "Abcdefg123".to_string(),
            confirm_password: "Abcdefg123".to_string(),
            accept_terms: true,
        }
    }

    #[test]
    fn valid_request_has_no_violations() {
        assert!(validate(&valid_request()).is_empty());
    }

    #[test]
    fn matricula_shape_enforced() {
        let mut request = valid_request();
        request.matricula = "A112345678901".to_string();
        assert_eq!(validate(&request).len(), 1);

        request.matricula = "AB1234567890".to_string();
        assert_eq!(validate(&request).len(), 1);

        request.matricula = "AB123456789012".to_string();
        assert_eq!(validate(&request).len(), 1);
    }

    #[test]
    fn username_length_enforced() {
        let mut request = valid_request();
        request.username = "ab".to_string();
        assert_eq!(validate(&request).len(), 1);

        request.username = "a".repeat(26);
        assert_eq!(validate(&request).len(), 1);

        request.username = "a".repeat(25);
        assert!(validate(&request).is_empty());
    }

    #[test]
    fn all_violations_are_collected() {
        let request = RegisterRequest {
            matricula: "bad".to_string(),
            username: "x".to_string(),
            password: "short".to_string(),
            confirm_password: "different".to_string(),
            accept_terms: false,
        };
        let violations = validate(&request);
        // matricula + username + password (length, upper, digit) + confirm + terms
        assert!(violations.len() >= 6, "got: {violations:?}");
    }

    #[test]
    fn password_policy() {
        assert!(password_violations("Abcdefg123").is_empty());
        assert!(!password_violations("abcdefg123").is_empty()); // no uppercase
        assert!(!password_violations("Abcdefghij").is_empty()); // no digit
        assert!(!password_violations("Abc123").is_empty()); // too short
        assert!(!password_violations("Abcdefg123!").is_empty()); // forbidden char
        assert!(!password_violations("Abcdefg123?").is_empty());
        assert!(!password_violations("Abcdefg123¡").is_empty());
    }
}
