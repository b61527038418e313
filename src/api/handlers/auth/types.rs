//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub matricula: String,
    pub username: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(rename = "acceptTerms")]
    pub accept_terms: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    #[serde(rename = "requiresGoogleAuthSetup")]
    pub requires_google_auth_setup: bool,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub message: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(rename = "emailOrUsername")]
    pub email_or_username: String,
    pub password: String,
}

/// Issued after a password or email-code success; the client continues to
/// the TOTP step (or its first-time setup) with the challenge token.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub message: String,
    #[serde(rename = "requiresGoogleAuth", skip_serializing_if = "Option::is_none")]
    pub requires_google_auth: Option<bool>,
    #[serde(
        rename = "requiresGoogleAuthSetup",
        skip_serializing_if = "Option::is_none"
    )]
    pub requires_google_auth_setup: Option<bool>,
    #[serde(rename = "tempToken")]
    pub temp_token: String,
}

impl ChallengeResponse {
    #[must_use]
    pub fn new(has_two_factor: bool, temp_token: String) -> Self {
        if has_two_factor {
            Self {
                message: "Enter your Google Authenticator code".to_string(),
                requires_google_auth: Some(true),
                requires_google_auth_setup: None,
                temp_token,
            }
        } else {
            Self {
                message: "Set up your two-factor authentication".to_string(),
                requires_google_auth: None,
                requires_google_auth_setup: Some(true),
                temp_token,
            }
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct SetupTwoFactorRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetupTwoFactorResponse {
    /// Provisioning QR as a PNG data URL.
    pub qr: String,
    /// Plaintext backup codes, present only on first creation.
    #[serde(rename = "backupCodes")]
    pub backup_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyTwoFactorRequest {
    #[serde(rename = "tempToken")]
    pub temp_token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "totpCode")]
    pub totp_code: Option<String>,
    #[serde(rename = "backupCode")]
    pub backup_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyTwoFactorResponse {
    pub token: String,
    pub user: UserView,
}

/// Safe user projection; never carries the credential hash.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendEmailCodeRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendEmailCodeResponse {
    pub message: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub user: ProfileView,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn register_request_uses_camel_case_keys() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "matricula": "AB12345678901",
            "username": "alice",
            "password": "Abcdefg123",
            "confirmPassword": "Abcdefg123",
            "acceptTerms": true,
        }))
        .unwrap();
        assert_eq!(request.confirm_password, "Abcdefg123");
        assert!(request.accept_terms);
    }

    #[test]
    fn register_response_wire_shape() {
        let response = RegisterResponse {
            requires_google_auth_setup: true,
            user_id: "u-1".to_string(),
            message: "ok".to_string(),
            email: "a@x.com".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["requiresGoogleAuthSetup"], true);
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["email"], "a@x.com");
    }

    #[test]
    fn challenge_response_enabled_account() {
        let response = ChallengeResponse::new(true, "tok".to_string());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["requiresGoogleAuth"], true);
        assert_eq!(value["tempToken"], "tok");
        assert!(value.get("requiresGoogleAuthSetup").is_none());
    }

    #[test]
    fn challenge_response_unenrolled_account() {
        let response = ChallengeResponse::new(false, "tok".to_string());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["requiresGoogleAuthSetup"], true);
        assert!(value.get("requiresGoogleAuth").is_none());
    }

    #[test]
    fn verify_request_accepts_either_identifier() {
        let by_user: VerifyTwoFactorRequest = serde_json::from_value(serde_json::json!({
            "userId": "u-1",
            "totpCode": "123456",
        }))
        .unwrap();
        assert!(by_user.user_id.is_some());
        assert!(by_user.temp_token.is_none());

        let by_token: VerifyTwoFactorRequest = serde_json::from_value(serde_json::json!({
            "tempToken": "tok",
            "backupCode": "abcd1234",
        }))
        .unwrap();
        assert!(by_token.temp_token.is_some());
        assert_eq!(by_token.backup_code.as_deref(), Some("abcd1234"));
    }

    #[test]
    fn setup_response_empty_backup_codes_serializes_as_array() {
        let response = SetupTwoFactorResponse {
            qr: "data:image/png;base64,xyz".to_string(),
            backup_codes: Vec::new(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["backupCodes"], serde_json::json!([]));
    }
}
