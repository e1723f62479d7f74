//! Opaque bearer token issuance and resolution.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::storage::UserRecord;
use super::utils::{generate_token, hash_token, is_unique_violation};

/// Mint a new access token for the user and return the raw value.
///
/// Only the SHA-256 hash is stored. Collisions on 32 random bytes are
/// practically impossible but the unique index makes them loud, so retry a
/// few times instead of failing the login.
pub(super) async fn issue_token(pool: &PgPool, user_id: Uuid) -> Result<String> {
    let query = r"
        INSERT INTO access_tokens (user_id, token_hash, name)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_token()?;
        let token_hash = hash_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind("api")
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert access token"),
        }
    }

    Err(anyhow!("failed to generate unique access token"))
}

/// Resolve a raw bearer token to its user, recording last use.
pub(super) async fn resolve_token(pool: &PgPool, token: &str) -> Result<Option<UserRecord>> {
    let token_hash = hash_token(token);

    let query = r"
        SELECT users.id, users.name, users.email, users.password_hash,
               users.email_verified_at IS NOT NULL AS email_verified
        FROM access_tokens
        JOIN users ON users.id = access_tokens.user_id
        WHERE access_tokens.token_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(&token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to resolve access token")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Last-use tracking is for audit visibility only.
    let query = r"
        UPDATE access_tokens
        SET last_used_at = NOW()
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update access token last_used_at")?;

    Ok(Some(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
    }))
}

/// Delete the token presented on the current request. Idempotent.
pub(super) async fn revoke_token(pool: &PgPool, token: &str) -> Result<()> {
    let token_hash = hash_token(token);

    let query = "DELETE FROM access_tokens WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke access token")?;

    Ok(())
}
