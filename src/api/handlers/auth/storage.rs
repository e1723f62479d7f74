//! Database helpers for users, roles, and verification state.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;

/// Outcome when attempting to create a new user row.
#[derive(Debug)]
pub(super) enum InsertUserOutcome {
    Created(Uuid),
    EmailTaken,
}

/// User fields needed by the auth flows.
#[derive(Debug, Clone)]
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) email: String,
    pub(super) password_hash: String,
    pub(super) email_verified: bool,
}

const SELECT_USER_BY_EMAIL: &str = r"
        SELECT id, name, email, password_hash,
               email_verified_at IS NOT NULL AS email_verified
        FROM users
        WHERE email = $1
        LIMIT 1
    ";

const SELECT_USER_BY_ID: &str = r"
        SELECT id, name, email, password_hash,
               email_verified_at IS NOT NULL AS email_verified
        FROM users
        WHERE id = $1
        LIMIT 1
    ";

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
    }
}

pub(super) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = SELECT_USER_BY_EMAIL
    );
    let row = sqlx::query(SELECT_USER_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| user_from_row(&row)))
}

pub(super) async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = SELECT_USER_BY_ID
    );
    let row = sqlx::query(SELECT_USER_BY_ID)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.map(|row| user_from_row(&row)))
}

pub(super) async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<InsertUserOutcome> {
    let query = r"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertUserOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::EmailTaken),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Replace the user's role set with exactly `role_ids`.
pub(super) async fn sync_roles(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    role_ids: &[i64],
) -> Result<()> {
    let query = "DELETE FROM role_user WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to clear user roles")?;

    let query = r"
        INSERT INTO role_user (role_id, user_id)
        SELECT role_id, $1 FROM UNNEST($2::bigint[]) AS role_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(role_ids)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to attach user roles")?;

    Ok(())
}

/// Role names attached to a user, in seed order.
pub(super) async fn roles_of(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>> {
    let query = r"
        SELECT roles.name
        FROM role_user
        JOIN roles ON roles.id = role_user.role_id
        WHERE role_user.user_id = $1
        ORDER BY roles.id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to lookup user roles")?;

    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// Flip `email_verified_at` exactly once.
///
/// Returns `false` when the email was already verified, so callers can answer
/// with a conflict instead of silently succeeding twice.
pub(super) async fn mark_email_verified(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = r"
        UPDATE users
        SET email_verified_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
          AND email_verified_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;

    Ok(row.is_some())
}

/// The only write path for passwords; callers must pass an Argon2 hash.
pub(super) async fn update_password_hash(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
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
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InsertUserOutcome, UserRecord};
    use uuid::Uuid;

    #[test]
    fn insert_user_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", InsertUserOutcome::Created(Uuid::nil())),
            format!("Created({:?})", Uuid::nil())
        );
        assert_eq!(format!("{:?}", InsertUserOutcome::EmailTaken), "EmailTaken");
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            id: Uuid::nil(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            email_verified: false,
        };
        assert_eq!(record.email, "alice@example.com");
        assert!(!record.email_verified);
    }
}
