//! Password reset tokens: single-use, keyed by email, throttled.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::state::AuthConfig;
use super::storage::{find_user_by_email, update_password_hash};
use super::utils::{constant_time_eq, generate_token, hash_password, hash_token};
use crate::api::email::{enqueue_email, TEMPLATE_RESET_PASSWORD};

/// Outcome of a forgot-password request. Unknown emails report `Sent` so the
/// endpoint cannot be used to probe for accounts.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ForgotOutcome {
    Sent,
    Throttled,
}

/// Outcome of a reset attempt.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ResetOutcome {
    Ok,
    InvalidToken,
    InvalidUser,
}

/// Issue a reset token and queue the reset email.
///
/// At most one token exists per email; issuing replaces any previous one.
/// The throttle check and the replacement are a single conditional upsert,
/// so concurrent requests inside the window contend on the row and all but
/// one come back throttled.
pub(super) async fn request_reset(
    pool: &PgPool,
    config: &AuthConfig,
    email: &str,
) -> Result<ForgotOutcome> {
    let Some(user) = find_user_by_email(pool, email).await? else {
        return Ok(ForgotOutcome::Sent);
    };

    let mut tx = pool.begin().await.context("begin reset request transaction")?;

    let token = generate_token()?;
    let token_hash = hash_token(&token);

    // The conflict arm refuses to touch a row younger than the throttle
    // window; zero rows affected means Throttled.
    let query = r"
        INSERT INTO password_reset_tokens (email, token_hash, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (email) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            created_at = NOW()
        WHERE password_reset_tokens.created_at <= NOW() - ($3 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(token_hash)
        .bind(config.reset_throttle_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store password reset token")?;

    if result.rows_affected() == 0 {
        let _ = tx.rollback().await;
        return Ok(ForgotOutcome::Throttled);
    }

    let reset_url = format!(
        "{base}/reset-password?token={token}&email={email}",
        base = config.frontend_base_url(),
    );
    let payload = json!({
        "name": user.name,
        "email": email,
        "reset_url": reset_url,
    });
    enqueue_email(&mut tx, email, TEMPLATE_RESET_PASSWORD, &payload).await?;

    tx.commit().await.context("commit reset request transaction")?;

    Ok(ForgotOutcome::Sent)
}

/// Consume a reset token and install the new password.
///
/// The token row is deleted in the same transaction as the password update,
/// so a token can never be redeemed twice.
pub(super) async fn reset_password(
    pool: &PgPool,
    config: &AuthConfig,
    email: &str,
    token: &str,
    new_password: &str,
) -> Result<ResetOutcome> {
    let Some(user) = find_user_by_email(pool, email).await? else {
        return Ok(ResetOutcome::InvalidUser);
    };

    let query = r"
        SELECT token_hash
        FROM password_reset_tokens
        WHERE email = $1
          AND created_at > NOW() - ($2 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(config.reset_token_ttl_seconds())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup password reset token")?;

    let Some(row) = row else {
        return Ok(ResetOutcome::InvalidToken);
    };

    let stored_hash: Vec<u8> = row.get("token_hash");
    if !constant_time_eq(&stored_hash, &hash_token(token)) {
        return Ok(ResetOutcome::InvalidToken);
    }

    let password_hash = hash_password(new_password)?;

    let mut tx = pool.begin().await.context("begin password reset transaction")?;

    update_password_hash(&mut tx, user.id, &password_hash).await?;

    let query = "DELETE FROM password_reset_tokens WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume password reset token")?;

    tx.commit().await.context("commit password reset transaction")?;

    Ok(ResetOutcome::Ok)
}
