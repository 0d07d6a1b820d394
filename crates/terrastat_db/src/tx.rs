//! Scoped SERIALIZABLE transactions with conflict retry.
//!
//! A unit of work implements [`SerializableWork`]. [`run_serializable`] opens a
//! transaction, raises its isolation level, runs the work and commits. Any
//! error drops the `sqlx::Transaction`, which rolls it back; isolation is a
//! per-transaction setting so the connection needs no restoring afterwards.
//! Serialization failures re-run the whole unit on a fresh transaction.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DbError, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 16;
const DEFAULT_BASE_BACKOFF_MS: u64 = 5;
const DEFAULT_MAX_BACKOFF_MS: u64 = 500;

/// How often and how patiently serialization conflicts are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms: base_backoff.as_millis() as u64,
            max_backoff_ms: max_backoff.as_millis() as u64,
        }
    }

    /// Delay after the given failed attempt (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let millis = self
            .base_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Whether a failed attempt should be retried, and after what delay.
    pub fn retry_after(&self, attempt: u32, err: &DbError) -> Option<Duration> {
        if err.is_serialization_failure() && attempt < self.max_attempts {
            Some(self.backoff(attempt))
        } else {
            None
        }
    }
}

/// A read-then-write unit that must behave as if it ran alone.
///
/// `apply` may be invoked several times; each call sees a fresh transaction
/// and must not keep state between calls.
#[async_trait]
pub trait SerializableWork: Sync {
    type Output: Send;

    /// Short label for logs.
    fn label(&self) -> &'static str;

    async fn apply(&self, conn: &mut PgConnection) -> Result<Self::Output>;
}

/// Run `work` in a SERIALIZABLE transaction, retrying serialization failures.
pub async fn run_serializable<W>(
    conn: &mut PgConnection,
    policy: &RetryPolicy,
    work: &W,
) -> Result<W::Output>
where
    W: SerializableWork,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match attempt_once(conn, work).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = work.label(), attempt, "Serializable work succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        match policy.retry_after(attempt, &err) {
            Some(delay) => {
                warn!(
                    op = work.label(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Serialization conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None if err.is_serialization_failure() => {
                return Err(match err {
                    DbError::Sqlx(source) => DbError::RetriesExhausted {
                        attempts: attempt,
                        source,
                    },
                    other => other,
                });
            }
            None => return Err(err),
        }
    }
}

async fn attempt_once<W>(conn: &mut PgConnection, work: &W) -> Result<W::Output>
where
    W: SerializableWork,
{
    let mut tx = conn.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut *tx)
        .await?;

    // On error `tx` is dropped here and rolled back.
    let value = work.apply(&mut *tx).await?;
    tx.commit().await?;
    Ok(value)
}
