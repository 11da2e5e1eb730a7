/// Role derivation
use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Principal roles, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Principal whose email matches the configured admin email
    Admin,
    /// Owns a trainer row
    Trainer,
    /// Owns a client row
    Client,
    /// Authenticated with no memberships
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Trainer => "trainer",
            Role::Client => "client",
            Role::User => "user",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "trainer" => Ok(Role::Trainer),
            "client" => Ok(Role::Client),
            "user" => Ok(Role::User),
            _ => Err(HubError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Apply precedence Admin > Trainer > Client > User
    pub fn from_memberships(is_admin: bool, is_trainer: bool, is_client: bool) -> Self {
        if is_admin {
            Role::Admin
        } else if is_trainer {
            Role::Trainer
        } else if is_client {
            Role::Client
        } else {
            Role::User
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives a principal's role from the admin email and membership rows.
///
/// The result is evaluated once at login and embedded in the token. Later
/// membership changes are not reflected until the principal logs in again,
/// so a token's role may be stale for at most the token lifetime.
#[derive(Clone)]
pub struct RoleResolver {
    db: SqlitePool,
    admin_email: String,
}

impl RoleResolver {
    pub fn new(db: SqlitePool, admin_email: &str) -> Self {
        Self {
            db,
            admin_email: admin_email.trim().to_lowercase(),
        }
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Resolve the current role of a principal
    pub async fn resolve(&self, principal_id: i64) -> HubResult<Role> {
        let row = sqlx::query(
            r#"
            SELECT p.email AS email,
                   EXISTS(SELECT 1 FROM trainer t WHERE t.principal_id = p.id) AS is_trainer,
                   EXISTS(SELECT 1 FROM client c WHERE c.principal_id = p.id) AS is_client
            FROM principal p
            WHERE p.id = ?1
            "#,
        )
        .bind(principal_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| HubError::NotFound(format!("Principal {} not found", principal_id)))?;

        let email: String = row.get("email");
        let is_trainer: i64 = row.get("is_trainer");
        let is_client: i64 = row.get("is_client");

        Ok(Role::from_memberships(
            email.to_lowercase() == self.admin_email,
            is_trainer != 0,
            is_client != 0,
        ))
    }
}
