//! Database helpers for accounts, sessions and out-of-band codes.
//!
//! Every statement runs under a `db.query` span. Lockout counters live in
//! account rows so they survive restarts and stay consistent across
//! concurrent server instances; the increment-and-maybe-lock is a single
//! atomic statement, never read-then-write.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{ClientInfo, hash_session_token, is_unique_violation};

/// Allowlisted identity row; read-only from the service's perspective.
pub(super) struct AuthorizedRecord {
    pub(super) email: String,
}

/// Account fields the auth workflows need. `is_locked` is computed against
/// the database clock so callers never compare timestamps themselves.
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) username: String,
    pub(super) password_hash: String,
    pub(super) is_locked: bool,
}

/// Outcome when attempting to create an account.
#[derive(Debug)]
pub(super) enum InsertUserOutcome {
    Created(Uuid),
    Conflict,
}

/// Live (unexpired) session row.
pub(super) struct SessionRecord {
    pub(super) id: Uuid,
    pub(super) user_id: Uuid,
}

/// Safe profile projection for `/auth/me`.
pub(super) struct ProfileRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) username: String,
    pub(super) is_active: bool,
    pub(super) created_at: String,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        is_locked: row.get("is_locked"),
    }
}

async fn find_user_where(
    pool: &PgPool,
    query: &'static str,
    bind: impl FnOnce(sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments>)
        -> sqlx::query::Query<'static, sqlx::Postgres, sqlx::postgres::PgArguments>,
) -> Result<Option<UserRecord>> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = bind(sqlx::query(query))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up account")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, username, password_hash,
               (locked_until IS NOT NULL AND locked_until > NOW()) AS is_locked
        FROM users
        WHERE email = $1
        LIMIT 1
    ";
    let email = email.to_string();
    find_user_where(pool, query, move |q| q.bind(email)).await
}

pub(super) async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, username, password_hash,
               (locked_until IS NOT NULL AND locked_until > NOW()) AS is_locked
        FROM users
        WHERE username = $1
        LIMIT 1
    ";
    let username = username.to_string();
    find_user_where(pool, query, move |q| q.bind(username)).await
}

pub(super) async fn find_user_by_matricula(
    pool: &PgPool,
    matricula: &str,
) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, username, password_hash,
               (locked_until IS NOT NULL AND locked_until > NOW()) AS is_locked
        FROM users
        WHERE matricula = $1
        LIMIT 1
    ";
    let matricula = matricula.to_string();
    find_user_where(pool, query, move |q| q.bind(matricula)).await
}

pub(super) async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = r"
        SELECT id, email, username, password_hash,
               (locked_until IS NOT NULL AND locked_until > NOW()) AS is_locked
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    find_user_where(pool, query, move |q| q.bind(id)).await
}

pub(super) async fn find_authorized_by_matricula(
    pool: &PgPool,
    matricula: &str,
) -> Result<Option<AuthorizedRecord>> {
    let query = "SELECT email FROM authorized_users WHERE matricula = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(matricula)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up authorized identity")?;
    Ok(row.map(|row| AuthorizedRecord {
        email: row.get("email"),
    }))
}

/// Create an account in pending (inactive) state.
///
/// Unique violations on email, matricula or username are reported as
/// `Conflict`; the constraint, not the pre-checks, is the source of truth
/// under concurrent registration attempts.
pub(super) async fn insert_user(
    pool: &PgPool,
    matricula: &str,
    email: &str,
    username: &str,
    password_hash: &str,
) -> Result<InsertUserOutcome> {
    let query = r"
        INSERT INTO users (matricula, email, username, password_hash, is_active)
        VALUES ($1, $2, $3, $4, false)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(matricula)
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertUserOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

/// Record a failed password attempt and, when the post-increment count
/// reaches the threshold, set the lockout in the same statement.
///
/// Returns the post-increment failed attempt count.
pub(super) async fn record_failed_login(
    pool: &PgPool,
    user_id: Uuid,
    max_failed: i32,
    lockout_minutes: i64,
) -> Result<i32> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = failed_login_attempts + 1,
            locked_until = CASE
                WHEN failed_login_attempts + 1 >= $2
                THEN NOW() + ($3 * INTERVAL '1 minute')
                ELSE locked_until
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING failed_login_attempts
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(max_failed)
        .bind(lockout_minutes)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to record failed login")?;
    Ok(row.get("failed_login_attempts"))
}

/// Clear the failure counter and any lockout after a successful password check.
pub(super) async fn reset_failed_logins(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = 0, locked_until = NULL, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset failed logins")?;
    Ok(())
}

pub(super) async fn update_password(pool: &PgPool, user_id: Uuid, password_hash: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $1, updated_at = NOW()
        WHERE id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

/// Insert a session row. The same table backs short-lived challenge tokens
/// and full authenticated sessions; only the TTL differs. Only the token's
/// hash is stored.
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    client: &ClientInfo,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO sessions (user_id, token_hash, ip_address, user_agent, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(hash_session_token(token))
        .bind(client.ip.as_deref())
        .bind(client.user_agent.as_deref())
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

/// Look up a live session by token; expired rows are invisible. The
/// presented token is hashed before comparison, never compared raw.
pub(super) async fn lookup_session(pool: &PgPool, token: &str) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT id, user_id
        FROM sessions
        WHERE token_hash = $1 AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hash_session_token(token))
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up session")?;
    Ok(row.map(|row| SessionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
    }))
}

/// Delete a session by id. Challenge tokens are single-use: the exchange in
/// the verify workflow ends with this call.
pub(super) async fn delete_session(pool: &PgPool, session_id: Uuid) -> Result<()> {
    let query = "DELETE FROM sessions WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Delete by token for logout. Idempotent; missing rows are fine.
pub(super) async fn delete_session_by_token(pool: &PgPool, token: &str) -> Result<()> {
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(hash_session_token(token))
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session by token")?;
    Ok(())
}

/// Replace a session's token and push out its expiry (token rotation).
pub(super) async fn rotate_session(
    pool: &PgPool,
    session_id: Uuid,
    new_token: &str,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET token_hash = $1, expires_at = NOW() + ($2 * INTERVAL '1 second')
        WHERE id = $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(hash_session_token(new_token))
        .bind(ttl_seconds)
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to rotate session")?;
    Ok(())
}

/// Store an out-of-band email code; the latest code replaces any prior one.
pub(super) async fn upsert_email_code(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    ttl_minutes: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO email_verifications (user_id, code, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 minute'))
        ON CONFLICT (user_id) DO UPDATE
        SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at, created_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(code)
        .bind(ttl_minutes)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert email verification code")?;
    Ok(())
}

/// Atomically consume an email code: the row is checked for validity and
/// deleted in one statement, so a code cannot be redeemed twice.
pub(super) async fn take_email_code(pool: &PgPool, user_id: Uuid, code: &str) -> Result<bool> {
    let query = r"
        DELETE FROM email_verifications
        WHERE user_id = $1 AND code = $2 AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(code)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume email verification code")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn insert_reset_code(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    ttl_minutes: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset (user_id, reset_code, is_used, expires_at)
        VALUES ($1, $2, false, NOW() + ($3 * INTERVAL '1 minute'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(code)
        .bind(ttl_minutes)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert password reset code")?;
    Ok(())
}

/// Atomically mark the newest matching reset code used. A second redeem of
/// the same code finds nothing to update and fails.
pub(super) async fn consume_reset_code(pool: &PgPool, user_id: Uuid, code: &str) -> Result<bool> {
    let query = r"
        UPDATE password_reset
        SET is_used = true
        WHERE id = (
            SELECT id FROM password_reset
            WHERE user_id = $1
              AND reset_code = $2
              AND is_used = false
              AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(code)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume password reset code")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn find_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ProfileRecord>> {
    let query = r"
        SELECT id, email, username, is_active, created_at::text AS created_at
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load profile")?;
    Ok(row.map(|row| ProfileRecord {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::InsertUserOutcome;
    use uuid::Uuid;

    #[test]
    fn insert_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", InsertUserOutcome::Created(Uuid::nil())),
            format!("Created({})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", InsertUserOutcome::Conflict), "Conflict");
    }
}
