use crate::totp::models::TwoFactorRecord;
use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of attempting to insert a fresh credential.
///
/// `Conflict` means a concurrent setup call won the unique index on
/// `user_id`; callers treat it as the reuse branch, not an error.
#[derive(Debug)]
pub enum CreateOutcome {
    Created,
    Conflict,
}

pub struct TotpRepo;

impl TotpRepo {
    /// Fetch the credential for an account, if any.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<TwoFactorRecord>> {
        let query = r"
            SELECT id, user_id, secret_key, is_enabled, backup_codes
            FROM two_factor_auth
            WHERE user_id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, TwoFactorRecord>(query)
            .bind(user_id)
            .fetch_optional(pool)
            .instrument(span)
            .await
            .context("failed to fetch two-factor credential")
    }

    /// Insert a new credential in disabled state.
    ///
    /// The unique constraint on `user_id` is the single source of truth for
    /// the concurrent-setup race; a violation is reported as `Conflict`.
    ///
    /// # Errors
    /// Returns an error on any database failure other than a unique violation.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        secret_key: &str,
        backup_code_hashes: &[String],
    ) -> Result<CreateOutcome> {
        let query = r"
            INSERT INTO two_factor_auth (user_id, secret_key, is_enabled, backup_codes)
            VALUES ($1, $2, false, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(secret_key)
            .bind(backup_code_hashes)
            .execute(pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert two-factor credential"),
        }
    }

    /// Mark a credential enabled. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn enable(pool: &PgPool, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE two_factor_auth
            SET is_enabled = true, updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to enable two-factor credential")?;
        Ok(())
    }

    /// Atomically spend one backup code hash.
    ///
    /// The hash is checked for membership and removed in the same statement,
    /// so two parallel redemptions of the same code cannot both succeed.
    ///
    /// # Errors
    /// Returns an error if the database update fails.
    pub async fn consume_backup_code(pool: &PgPool, id: Uuid, code_hash: &str) -> Result<bool> {
        let query = r"
            UPDATE two_factor_auth
            SET backup_codes = array_remove(backup_codes, $1), updated_at = NOW()
            WHERE id = $2 AND $1 = ANY(backup_codes)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(code_hash)
            .bind(id)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to consume backup code")?;
        Ok(result.rows_affected() > 0)
    }

}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::CreateOutcome;

    #[test]
    fn create_outcome_debug_names() {
        assert_eq!(format!("{:?}", CreateOutcome::Created), "Created");
        assert_eq!(format!("{:?}", CreateOutcome::Conflict), "Conflict");
    }
}
