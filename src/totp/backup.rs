//! Backup code generation and verification.
//!
//! Backup codes are single-use recovery credentials issued alongside a
//! fresh TOTP secret. Only Argon2 hashes are stored; the plaintext batch is
//! returned to the caller exactly once and cannot be recovered later.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{RngCore, rngs::OsRng};

const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_BYTES: usize = 4;
const BACKUP_CODE_LEN: usize = BACKUP_CODE_BYTES * 2;

/// A freshly generated backup-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generate a new batch of 10 codes, 8 hex characters each.
    ///
    /// # Errors
    /// Returns an error if random generation or hashing fails.
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(&mut rng)
    }

    fn generate_with_rng<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_code(rng)?;
            let hash = hash_backup_code(&code)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize a backup code for verification: lowercase hex, fixed length.
///
/// # Errors
/// Returns an error for codes of the wrong shape.
pub fn normalize_backup_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .map(|ch| ch.to_ascii_lowercase())
        .collect();

    if normalized.len() != BACKUP_CODE_LEN {
        return Err(anyhow::anyhow!("invalid backup code length"));
    }
    if !normalized.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow::anyhow!("invalid backup code characters"));
    }

    Ok(normalized)
}

/// Verify a backup code against a stored hash.
#[must_use]
pub fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    let Ok(normalized) = normalize_backup_code(code) else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok()
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; BACKUP_CODE_BYTES];
    rng.try_fill_bytes(&mut raw)
        .context("failed to generate backup code")?;
    let mut code = String::with_capacity(BACKUP_CODE_LEN);
    for byte in raw {
        code.push_str(&format!("{byte:02x}"));
    }
    Ok(code)
}

fn hash_backup_code(code: &str) -> Result<String> {
    let normalized = normalize_backup_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash backup code"))?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{BackupCodeBatch, normalize_backup_code, verify_backup_code};

    #[test]
    fn batch_has_ten_hex_codes() {
        let batch = BackupCodeBatch::generate().unwrap();
        assert_eq!(batch.codes.len(), 10);
        assert_eq!(batch.code_hashes.len(), 10);
        for code in &batch.codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|ch| ch.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(normalize_backup_code("AB-CD 12 34").unwrap(), "abcd1234");
        assert!(normalize_backup_code("abcd123").is_err());
        assert!(normalize_backup_code("abcd123z").is_err());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let batch = BackupCodeBatch::generate().unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(verify_backup_code(code, hash));
        assert!(!verify_backup_code("00000000", hash));
    }

    #[test]
    fn verify_tolerates_garbage_inputs() {
        let batch = BackupCodeBatch::generate().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(!verify_backup_code("not a code", hash));
        assert!(!verify_backup_code("", "not a hash"));
    }
}
