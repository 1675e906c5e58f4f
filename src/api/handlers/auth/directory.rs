//! User directory: database helpers over the `users` table.
//!
//! Email uniqueness is enforced by the unique constraint on the normalized
//! column, so duplicate registration races resolve atomically in the
//! database; callers observe them as `Conflict` outcomes, never as errors.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::principal::Role;
use super::utils::is_unique_violation;

/// Outcome when attempting to create a locally registered user.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(Uuid),
    Conflict,
}

/// Outcome of provisioning or updating an externally authenticated user.
#[derive(Debug)]
pub(super) enum ExternalUpsert {
    Ready,
    EmailConflict,
}

/// A full directory row. `email` is NULL for externally authenticated
/// accounts whose provider token carried no email claim.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: Option<String>,
    pub(crate) full_name: String,
    pub(crate) role: Role,
    pub(crate) password_hash: Option<String>,
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in directory: {role}"))?;
    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        role,
        password_hash: row.get("password_hash"),
    })
}

pub(super) async fn lookup_user_by_email(
    pool: &PgPool,
    email_normalized: &str,
) -> Result<Option<UserRecord>> {
    let query =
        "SELECT id, email, full_name, role, password_hash FROM users WHERE email = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    row.as_ref().map(record_from_row).transpose()
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query =
        "SELECT id, email, full_name, role, password_hash FROM users WHERE id = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    row.as_ref().map(record_from_row).transpose()
}

/// Insert a locally registered user. A duplicate email resolves to
/// [`SignupOutcome::Conflict`] via the unique constraint.
pub(super) async fn insert_local_user(
    pool: &PgPool,
    email_normalized: &str,
    full_name: &str,
    role: Role,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (email, full_name, role, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email_normalized)
        .bind(full_name)
        .bind(role.as_str())
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Provision an externally authenticated user with the provider-assigned id.
///
/// The id conflict path (`DO NOTHING`) makes concurrent first logins
/// idempotent; an email collision with a different account surfaces as
/// [`ExternalUpsert::EmailConflict`]. The row carries no local credential.
pub(super) async fn insert_external_user(
    pool: &PgPool,
    id: Uuid,
    email_normalized: Option<&str>,
    full_name: &str,
) -> Result<ExternalUpsert> {
    let query = r"
        INSERT INTO users (id, email, full_name, role, password_hash)
        VALUES ($1, $2, $3, 'member', NULL)
        ON CONFLICT (id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(email_normalized)
        .bind(full_name)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(ExternalUpsert::Ready),
        Err(err) if is_unique_violation(&err) => Ok(ExternalUpsert::EmailConflict),
        Err(err) => Err(err).context("failed to insert external user"),
    }
}

/// Update email and display name for an externally authenticated user.
/// The role column is never written by sync paths, so locally assigned
/// roles stick across provider logins. Callers pass the already-merged
/// values, so a token missing a claim never blanks a stored field.
pub(super) async fn sync_external_profile(
    pool: &PgPool,
    id: Uuid,
    email_normalized: Option<&str>,
    full_name: &str,
) -> Result<ExternalUpsert> {
    let query = r"
        UPDATE users
        SET email = $2,
            full_name = $3,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(email_normalized)
        .bind(full_name)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(ExternalUpsert::Ready),
        Err(err) if is_unique_violation(&err) => Ok(ExternalUpsert::EmailConflict),
        Err(err) => Err(err).context("failed to sync external profile"),
    }
}

pub(crate) async fn fetch_user_records(pool: &PgPool) -> Result<Vec<UserRecord>> {
    let query =
        "SELECT id, email, full_name, role, password_hash FROM users ORDER BY created_at";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;

    rows.iter().map(record_from_row).collect()
}

/// Assign a role. Returns `false` when the user does not exist.
pub(crate) async fn assign_user_role(pool: &PgPool, id: Uuid, role: Role) -> Result<bool> {
    let query = r"
        UPDATE users
        SET role = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(role.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to assign role")?;

    Ok(result.rows_affected() > 0)
}

/// Delete a user; refresh tokens go with the row via `ON DELETE CASCADE`.
pub(crate) async fn delete_user_record(pool: &PgPool, id: Uuid) -> Result<bool> {
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", SignupOutcome::Created(Uuid::nil())),
            format!("Created({})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }

    #[test]
    fn external_upsert_debug_names() {
        assert_eq!(format!("{:?}", ExternalUpsert::Ready), "Ready");
        assert_eq!(
            format!("{:?}", ExternalUpsert::EmailConflict),
            "EmailConflict"
        );
    }

    #[test]
    fn user_record_exposes_external_sentinel() {
        let record = UserRecord {
            id: Uuid::nil(),
            email: Some("e@example.com".to_string()),
            full_name: "E".to_string(),
            role: Role::Member,
            password_hash: None,
        };
        assert!(record.password_hash.is_none());
        assert_eq!(record.role, Role::Member);
    }
}
