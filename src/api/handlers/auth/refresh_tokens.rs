//! Refresh token storage.
//!
//! Raw token values never touch the database; rows hold a SHA-256 hash and
//! an expiry. Expiry is enforced lazily at presentation time, and a user may
//! hold any number of concurrent tokens (one per device/session).

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::errors::AuthError;
use super::utils::{generate_refresh_token, hash_refresh_token, is_unique_violation};

/// A stored refresh token, expiry carried as a Unix timestamp so the
/// expiry predicate stays a pure function.
#[derive(Debug, Clone, Copy)]
pub(super) struct RefreshTokenRecord {
    pub(super) id: Uuid,
    pub(super) user_id: Uuid,
    pub(super) expires_at_unix: i64,
}

/// A token is expired strictly after its expiry instant; a presentation at
/// exactly `expires_at` still passes.
pub(super) const fn token_expired(expires_at_unix: i64, now_unix_seconds: i64) -> bool {
    now_unix_seconds > expires_at_unix
}

/// Mint and store a new refresh token, returning the raw value exactly once.
///
/// Retries on the (practically unreachable) hash collision, same as any
/// other unique-violation race.
pub(super) async fn create_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO refresh_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_refresh_token()?;
        let token_hash = hash_refresh_token(&token);
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert refresh token"),
        }
    }

    Err(anyhow!("failed to generate unique refresh token"))
}

/// Find a refresh token by the hash of its presented value.
pub(super) async fn lookup_refresh_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<RefreshTokenRecord>> {
    let query = r"
        SELECT id, user_id, EXTRACT(EPOCH FROM expires_at)::bigint AS expires_at_unix
        FROM refresh_tokens
        WHERE token_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup refresh token")?;

    Ok(row.map(|row| RefreshTokenRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at_unix: row.get("expires_at_unix"),
    }))
}

/// Reject and remove an expired token; pass a live one through.
///
/// Removal is lazy: expired rows sit in the table until presented.
///
/// # Errors
///
/// Returns [`AuthError::TokenExpired`] once the row has been deleted.
pub(super) async fn verify_expiration(
    pool: &PgPool,
    record: RefreshTokenRecord,
    now_unix_seconds: i64,
) -> Result<RefreshTokenRecord, AuthError> {
    if !token_expired(record.expires_at_unix, now_unix_seconds) {
        return Ok(record);
    }

    let query = "DELETE FROM refresh_tokens WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(record.id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired refresh token")?;

    Err(AuthError::TokenExpired)
}

/// The rotation may only proceed when this transaction's DELETE consumed the
/// presented row; zero rows means a concurrent refresh already redeemed it.
pub(super) const fn rotation_consumed_token(rows_affected: u64) -> bool {
    rows_affected == 1
}

/// Replace a presented token with a fresh one atomically.
///
/// Delete and insert share a transaction so a crash never leaves the caller
/// with zero or two live tokens from one refresh. The single-use contract
/// lives here: if the DELETE matches no row, another refresh won the race
/// and this one rolls back with [`AuthError::TokenNotFound`] instead of
/// minting a second token. The loop restarts the transaction on a hash
/// collision because a failed statement poisons it.
pub(super) async fn rotate_refresh_token(
    pool: &PgPool,
    old_id: Uuid,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String, AuthError> {
    let delete_query = "DELETE FROM refresh_tokens WHERE id = $1";
    let insert_query = r"
        INSERT INTO refresh_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";

    for _ in 0..3 {
        let mut tx = pool.begin().await.context("begin rotate transaction")?;

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = delete_query
        );
        let deleted = sqlx::query(delete_query)
            .bind(old_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete rotated refresh token")?;

        if !rotation_consumed_token(deleted.rows_affected()) {
            let _ = tx.rollback().await;
            return Err(AuthError::TokenNotFound);
        }

        let token = generate_refresh_token()?;
        let token_hash = hash_refresh_token(&token);
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert_query
        );
        let result = sqlx::query(insert_query)
            .bind(token_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => {
                tx.commit().await.context("commit rotate transaction")?;
                return Ok(token);
            }
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
            }
            Err(err) => {
                return Err(err)
                    .context("failed to insert rotated refresh token")
                    .map_err(AuthError::from);
            }
        }
    }

    Err(AuthError::from(anyhow!(
        "failed to generate unique refresh token"
    )))
}

/// Revoke every refresh token the user holds. A single DELETE statement, so
/// tokens created concurrently with the call may survive it.
pub(super) async fn delete_refresh_tokens_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = "DELETE FROM refresh_tokens WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete refresh tokens for user")?;

    Ok(result.rows_affected())
}
