//! Small helpers for credential hashing, token generation and request context.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Per-request client context passed into the workflows instead of being
/// read from ambient framework state.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Collect originating address and user agent from request headers.
#[must_use]
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip: extract_client_ip(headers),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Hash a credential with Argon2id; the PHC string encodes salt and cost.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_credential(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash credential"))?
        .to_string();
    Ok(hash)
}

/// Verify a credential against its stored hash. Never compare hashes directly.
#[must_use]
pub fn verify_credential(plaintext: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

/// Create an opaque bearer token: 48 random bytes, hex encoded.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; 48];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    let mut token = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(token, "{byte:02x}");
    }
    Ok(token)
}

/// Uniform 6-digit numeric code, zero padded.
///
/// `gen_range` samples without modulo bias, which matters here: a skewed
/// code distribution would weaken brute-force resistance.
#[must_use]
pub fn generate_numeric_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Hash a session or challenge token so raw values never touch the
/// database. Lookups hash the presented token and compare hashes.
#[must_use]
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Pull a bearer token out of the Authorization header.
#[must_use]
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Extract a client IP for rate limiting from common proxy headers.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn hash_and_verify_credential() {
        let hash = hash_credential("Abcdefg123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_credential("Abcdefg123", &hash));
        assert!(!verify_credential("Abcdefg124", &hash));
    }

    #[test]
    fn two_hashes_of_same_input_differ() {
        // Each hash carries its own salt.
        let first = hash_credential("Abcdefg123").unwrap();
        let second = hash_credential("Abcdefg123").unwrap();
        assert_ne!(first, second);
        assert!(verify_credential("Abcdefg123", &first));
        assert!(verify_credential("Abcdefg123", &second));
    }

    #[test]
    fn verify_credential_tolerates_bad_hash() {
        assert!(!verify_credential("whatever", "not-a-phc-string"));
    }

    #[test]
    fn opaque_token_is_96_hex_chars() {
        let token = generate_opaque_token().unwrap();
        assert_eq!(token.len(), 96);
        assert!(token.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn opaque_tokens_are_unique() {
        let first = generate_opaque_token().unwrap();
        let second = generate_opaque_token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn numeric_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|ch| ch.is_ascii_digit()));
        }
    }

    #[test]
    fn session_token_hash_is_stable_hex() {
        let first = hash_session_token("token");
        let second = hash_session_token("token");
        let different = hash_session_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn extract_bearer_token_variants() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        headers.insert("authorization", HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer_token(&headers), Some("xyz".to_string()));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn client_info_collects_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("test-agent/1.0"));
        let info = client_info(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(info.ip, None);
    }
}
