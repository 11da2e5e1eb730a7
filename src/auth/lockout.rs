//! Failed-login lockout policies.
//!
//! The policy is a toggle: [`DisabledLockout`] never blocks anyone and is the
//! default, [`ThresholdLockout`] locks an account for a fixed window once the
//! configured number of consecutive failures is reached.

use crate::config::LockoutConfig;
use crate::db::account::LockoutState;
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

#[async_trait]
pub trait LockoutPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record_failed_attempt(&self, principal_id: i64) -> HubResult<()>;

    /// End of the active lock, if any
    async fn locked_until(&self, principal_id: i64) -> HubResult<Option<DateTime<Utc>>>;

    async fn record_success(&self, principal_id: i64) -> HubResult<()>;

    async fn check_locked(&self, principal_id: i64) -> HubResult<bool> {
        Ok(self.locked_until(principal_id).await?.is_some())
    }
}

/// Build the policy selected by configuration
pub fn lockout_policy(config: &LockoutConfig, db: SqlitePool) -> Arc<dyn LockoutPolicy> {
    if config.enabled {
        Arc::new(ThresholdLockout::new(
            db,
            config.max_failed_attempts,
            Duration::minutes(config.lockout_minutes),
        ))
    } else {
        Arc::new(DisabledLockout::new(db))
    }
}

async fn reset_counters(db: &SqlitePool, principal_id: i64) -> HubResult<()> {
    sqlx::query("UPDATE principal SET failed_attempts = 0, locked_until = NULL WHERE id = ?1")
        .bind(principal_id)
        .execute(db)
        .await?;
    Ok(())
}

/// No-op policy: failures are not counted and nobody is ever locked
pub struct DisabledLockout {
    db: SqlitePool,
}

impl DisabledLockout {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LockoutPolicy for DisabledLockout {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn record_failed_attempt(&self, principal_id: i64) -> HubResult<()> {
        tracing::debug!(principal_id, "lockout disabled, failure not counted");
        Ok(())
    }

    async fn locked_until(&self, _principal_id: i64) -> HubResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    async fn record_success(&self, principal_id: i64) -> HubResult<()> {
        reset_counters(&self.db, principal_id).await
    }
}

/// Locks an account after `max_attempts` consecutive failures
pub struct ThresholdLockout {
    db: SqlitePool,
    max_attempts: i64,
    window: Duration,
}

impl ThresholdLockout {
    pub fn new(db: SqlitePool, max_attempts: i64, window: Duration) -> Self {
        Self {
            db,
            max_attempts,
            window,
        }
    }
}

#[async_trait]
impl LockoutPolicy for ThresholdLockout {
    fn name(&self) -> &'static str {
        "threshold"
    }

    async fn record_failed_attempt(&self, principal_id: i64) -> HubResult<()> {
        let mut tx = self.db.begin().await?;

        let state: LockoutState =
            sqlx::query_as("SELECT failed_attempts, locked_until FROM principal WHERE id = ?1")
                .bind(principal_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| HubError::NotFound(format!("Principal {} not found", principal_id)))?;

        let now = Utc::now();
        // An expired lock starts a fresh count
        let previous = match state.locked_until {
            Some(until) if until <= now => 0,
            _ => state.failed_attempts,
        };
        let attempts = previous + 1;
        let locked_until = if attempts >= self.max_attempts {
            Some(now + self.window)
        } else {
            state.locked_until.filter(|until| *until > now)
        };

        sqlx::query("UPDATE principal SET failed_attempts = ?1, locked_until = ?2 WHERE id = ?3")
            .bind(attempts)
            .bind(locked_until)
            .bind(principal_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if attempts >= self.max_attempts {
            tracing::warn!(principal_id, attempts, "account locked after repeated failures");
        }

        Ok(())
    }

    async fn locked_until(&self, principal_id: i64) -> HubResult<Option<DateTime<Utc>>> {
        let until: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT locked_until FROM principal WHERE id = ?1")
                .bind(principal_id)
                .fetch_optional(&self.db)
                .await?;

        let now = Utc::now();
        Ok(until.flatten().filter(|until| *until > now))
    }

    async fn record_success(&self, principal_id: i64) -> HubResult<()> {
        reset_counters(&self.db, principal_id).await
    }
}
