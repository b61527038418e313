use sqlx::FromRow;
use uuid::Uuid;

/// One row of `two_factor_auth`. At most one per account, enforced by a
/// unique index on `user_id`.
#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Base32 TOTP seed, immutable after creation.
    pub secret_key: String,
    /// Flips true exactly once, on the first successful verification.
    pub is_enabled: bool,
    /// Argon2 hashes of unspent backup codes.
    pub backup_codes: Vec<String>,
}
