//! Transactional email outbox.
//!
//! Auth flows never talk to a mail server directly. They insert a row into
//! `email_outbox` inside the same transaction as the state change that
//! warrants the email, so a verification or reset email exists if and only
//! if the matching user/token row does. A background task polls the table,
//! locks a batch with `FOR UPDATE SKIP LOCKED`, and hands each row to an
//! `EmailSender`. Failures retry with exponential backoff and jitter until
//! `max_attempts`, then stay parked as `failed`.
//!
//! The default sender for local dev is `LogEmailSender`, which logs the
//! payload and reports success.

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Template for the signed email verification link.
pub(crate) const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";

/// Template for the password reset link.
pub(crate) const TEMPLATE_RESET_PASSWORD: &str = "reset_password";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Clamp nonsensical settings instead of failing startup.
    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        Self {
            poll_interval: if self.poll_interval.is_zero() {
                Duration::from_secs(1)
            } else {
                self.poll_interval
            },
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue an email inside the caller's transaction.
///
/// Commits and rollbacks of the surrounding transaction apply to the outbox
/// row too, which is the whole point of the outbox.
pub(crate) async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload: &Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();

        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }

            sleep(config.poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Lock a batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let send_result = sender.send(&message);
        settle_outbox_row(
            &mut tx,
            id,
            u32::try_from(attempts).unwrap_or(0),
            send_result,
            config,
        )
        .await?;
    }

    // Commit even when empty to release locks promptly.
    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn settle_outbox_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let attempts_column = i32::try_from(next_attempt).unwrap_or(i32::MAX);

    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW()
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(attempts_column)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to mark outbox row sent")?;
        }
        Err(err) if next_attempt >= config.max_attempts => {
            let query = r"
                UPDATE email_outbox
                SET status = 'failed',
                    attempts = $2,
                    last_error = $3
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(attempts_column)
                .bind(err.to_string())
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to mark outbox row failed")?;
        }
        Err(err) => {
            let delay = backoff_delay(next_attempt, config.backoff_base, config.backoff_max);
            let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
            let query = r"
                UPDATE email_outbox
                SET status = 'pending',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(attempts_column)
                .bind(err.to_string())
                .bind(delay_ms)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to schedule outbox retry")?;
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max);
    jitter_delay(delay.min(max))
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_zero_settings() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .normalize();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(4);
        let max = Duration::from_secs(60);

        // jitter keeps the delay within [half, full]
        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_secs(2) && first <= base);

        let third = backoff_delay(3, base, max);
        assert!(third >= Duration::from_secs(8) && third <= Duration::from_secs(16));

        let huge = backoff_delay(30, base, max);
        assert!(huge <= max);
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = EmailMessage {
            to_email: "alice@example.com".to_string(),
            template: TEMPLATE_VERIFY_EMAIL.to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
