use crate::totp::{
    backup::{self, BackupCodeBatch},
    models::TwoFactorRecord,
    repo::{CreateOutcome, TotpRepo},
};
use anyhow::{Result, anyhow};
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a setup request.
#[derive(Debug)]
pub enum SetupOutcome {
    /// Setup cannot be repeated once the credential is activated.
    AlreadyEnabled,
    /// A not-yet-activated secret already existed; its QR is rebuilt and the
    /// backup codes are not reissued (they were distributed once, hashed).
    Reused { qr: String },
    /// Fresh secret; the plaintext backup codes are returned exactly once.
    Created { qr: String, backup_codes: Vec<String> },
}

/// Result of a code verification.
#[derive(Debug)]
pub enum VerifyOutcome {
    NotConfigured,
    Invalid,
    Valid { activated: bool },
}

#[derive(Clone)]
pub struct TotpService {
    pool: PgPool,
    issuer: String,
    skew: u8,
}

impl TotpService {
    #[must_use]
    pub fn new(pool: PgPool, issuer: String, skew: u8) -> Self {
        Self { pool, issuer, skew }
    }

    /// Begin or resume two-factor setup for an account.
    ///
    /// Safe under concurrent duplicate calls: the unique constraint on
    /// `user_id` decides the winner and the loser re-reads and reuses the
    /// stored secret, so repeated calls return the same QR artifact.
    ///
    /// # Errors
    /// Returns an error if secret generation, hashing, or storage fails.
    pub async fn setup(&self, user_id: Uuid, username: &str) -> Result<SetupOutcome> {
        if let Some(existing) = TotpRepo::get_by_user(&self.pool, user_id).await? {
            if existing.is_enabled {
                return Ok(SetupOutcome::AlreadyEnabled);
            }
            info!(%user_id, "reusing pending two-factor secret");
            let qr = self.provisioning_qr(&existing.secret_key, username)?;
            return Ok(SetupOutcome::Reused { qr });
        }

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| anyhow!("secret generation error: {e:?}"))?;
        let totp = build_totp(&self.issuer, self.skew, secret_bytes, username)?;
        let secret_b32 = totp.get_secret_base32();

        let batch = BackupCodeBatch::generate()?;

        match TotpRepo::create(&self.pool, user_id, &secret_b32, &batch.code_hashes).await? {
            CreateOutcome::Created => {
                let qr = qr_data_url(&totp)?;
                Ok(SetupOutcome::Created {
                    qr,
                    backup_codes: batch.codes,
                })
            }
            CreateOutcome::Conflict => {
                // A concurrent setup call won the insert; fall back to its secret.
                warn!(%user_id, "two-factor credential already exists, reusing");
                let existing = TotpRepo::get_by_user(&self.pool, user_id)
                    .await?
                    .ok_or_else(|| anyhow!("two-factor credential vanished after conflict"))?;
                if existing.is_enabled {
                    return Ok(SetupOutcome::AlreadyEnabled);
                }
                let qr = self.provisioning_qr(&existing.secret_key, username)?;
                Ok(SetupOutcome::Reused { qr })
            }
        }
    }

    /// Verify a 6-digit code against the account's stored secret.
    ///
    /// The first successful verification activates the credential.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn verify(&self, user_id: Uuid, code: &str) -> Result<VerifyOutcome> {
        let Some(record) = TotpRepo::get_by_user(&self.pool, user_id).await? else {
            return Ok(VerifyOutcome::NotConfigured);
        };

        let totp = self.totp_for_record(&record)?;
        let valid = totp.check_current(code).unwrap_or(false);
        if !valid {
            return Ok(VerifyOutcome::Invalid);
        }

        self.activate_if_needed(&record).await
    }

    /// Redeem a single-use backup code in place of a TOTP code.
    ///
    /// Verification walks the stored hashes; the matching hash is then spent
    /// with an atomic check-and-remove, so a parallel redemption of the same
    /// code fails.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn redeem_backup(&self, user_id: Uuid, code: &str) -> Result<VerifyOutcome> {
        let Some(record) = TotpRepo::get_by_user(&self.pool, user_id).await? else {
            return Ok(VerifyOutcome::NotConfigured);
        };

        for hash in &record.backup_codes {
            if backup::verify_backup_code(code, hash) {
                if TotpRepo::consume_backup_code(&self.pool, record.id, hash).await? {
                    info!(%user_id, "backup code redeemed");
                    return self.activate_if_needed(&record).await;
                }
                // Lost the race against a parallel spend of the same code.
                return Ok(VerifyOutcome::Invalid);
            }
        }

        Ok(VerifyOutcome::Invalid)
    }

    async fn activate_if_needed(&self, record: &TwoFactorRecord) -> Result<VerifyOutcome> {
        if record.is_enabled {
            return Ok(VerifyOutcome::Valid { activated: false });
        }
        TotpRepo::enable(&self.pool, record.id).await?;
        info!(user_id = %record.user_id, "two-factor credential activated");
        Ok(VerifyOutcome::Valid { activated: true })
    }

    fn totp_for_record(&self, record: &TwoFactorRecord) -> Result<TOTP> {
        let secret_bytes = Secret::Encoded(record.secret_key.clone())
            .to_bytes()
            .map_err(|e| anyhow!("stored secret is not valid base32: {e:?}"))?;
        build_totp(&self.issuer, self.skew, secret_bytes, "user")
    }

    fn provisioning_qr(&self, secret_b32: &str, username: &str) -> Result<String> {
        let secret_bytes = Secret::Encoded(secret_b32.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("stored secret is not valid base32: {e:?}"))?;
        let totp = build_totp(&self.issuer, self.skew, secret_bytes, username)?;
        qr_data_url(&totp)
    }
}

/// Standard 30-second-step, 6-digit TOTP.
///
/// `skew` is the accepted steps before/after the current one; each extra
/// step roughly doubles the number of guessable valid codes.
fn build_totp(issuer: &str, skew: u8, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        6,
        skew,
        30,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| anyhow!("TOTP init error: {e}"))
}

fn qr_data_url(totp: &TOTP) -> Result<String> {
    let qr = totp
        .get_qr_base64()
        .map_err(|e| anyhow!("QR generation error: {e}"))?;
    Ok(format!("data:image/png;base64,{qr}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::build_totp;
    use totp_rs::Secret;

    fn secret_bytes() -> Vec<u8> {
        Secret::generate_secret().to_bytes().unwrap()
    }

    #[test]
    fn current_code_passes_within_skew() {
        let bytes = secret_bytes();
        let totp = build_totp("Recinto", 1, bytes, "alice").unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let code = totp.generate(now);
        assert!(totp.check(&code, now));
        // One step of skew in either direction is accepted.
        assert!(totp.check(&code, now + 30));
        assert!(totp.check(&code, now.saturating_sub(30)));
    }

    #[test]
    fn stale_code_outside_skew_fails() {
        let bytes = secret_bytes();
        let totp = build_totp("Recinto", 1, bytes, "alice").unwrap();
        let base = 1_700_000_000;

        let code = totp.generate(base);
        assert!(!totp.check(&code, base + 120));
    }

    #[test]
    fn wider_skew_accepts_older_codes() {
        let bytes = secret_bytes();
        let narrow = build_totp("Recinto", 1, bytes.clone(), "alice").unwrap();
        let wide = build_totp("Recinto", 4, bytes, "alice").unwrap();
        let base = 1_700_000_000;

        let code = narrow.generate(base);
        assert!(!narrow.check(&code, base + 90));
        assert!(wide.check(&code, base + 90));
    }

    #[test]
    fn secret_round_trips_through_base32() {
        let bytes = secret_bytes();
        let totp = build_totp("Recinto", 1, bytes.clone(), "alice").unwrap();
        let b32 = totp.get_secret_base32();
        let decoded = Secret::Encoded(b32).to_bytes().unwrap();
        assert_eq!(decoded, bytes);
    }
}
