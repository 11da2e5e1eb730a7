/// Account management
///
/// Registration, credential checks, session issuance, trainer profiles and
/// the admin-side account lifecycle (membership changes, deactivation,
/// deletion).

mod manager;

pub use manager::AccountManager;

use crate::auth::{IssuedToken, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Password change request; the current password must match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Trainer profile edit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainerProfileUpdate {
    pub speciality: Option<String>,
    pub bio: Option<String>,
}

/// Session response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub principal_id: i64,
    pub role: Role,
    pub display_name: String,
}

impl From<IssuedToken> for SessionResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_at: issued.claims.expires_at,
            principal_id: issued.claims.principal_id,
            role: issued.claims.role,
            display_name: issued.claims.display_name,
        }
    }
}

/// Role change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}
