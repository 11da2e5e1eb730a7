/// Account data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Principal record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Trainer membership projection: the trainer row id and the principal owning it
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MinimalTrainer {
    pub id: i64,
    pub owner_id: i64,
}

/// Public trainer profile joined with its principal
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TrainerProfile {
    pub trainer_id: i64,
    pub principal_id: i64,
    pub display_name: String,
    pub speciality: Option<String>,
    pub bio: Option<String>,
}

/// Lockout bookkeeping columns of a principal
#[derive(Debug, Clone, FromRow)]
pub struct LockoutState {
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}
