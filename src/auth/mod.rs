/// Authentication: tokens, roles, passwords, lockout and request extractors
pub mod lockout;
pub mod password;
pub mod roles;
pub mod token;

pub use lockout::{lockout_policy, LockoutPolicy};
pub use password::PasswordHasher;
pub use roles::{Role, RoleResolver};
pub use token::{IssuedToken, SessionClaims, TokenClaims, TokenService};

use crate::{api::middleware::extract_bearer_token, context::AppContext, error::HubError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// The caller of a workflow operation, taken from validated token claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub principal_id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(principal_id: i64, role: Role) -> Self {
        Self { principal_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), HubError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(HubError::Forbidden("Admin role required".to_string()))
        }
    }
}

impl From<&TokenClaims> for Actor {
    fn from(claims: &TokenClaims) -> Self {
        Self::new(claims.principal_id, claims.role)
    }
}

/// Authenticated context - extracts and validates the bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
    pub claims: TokenClaims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            HubError::AuthenticationRequired("Missing authorization header".to_string())
        })?;

        let claims = state.token_service.validate(&token).await?;

        Ok(AuthContext {
            actor: Actor::from(&claims),
            claims,
        })
    }
}

/// Optional authenticated context.
///
/// A request without credentials yields `None`; a request presenting a bad
/// token is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn actor(&self) -> Option<Actor> {
        self.auth.as_ref().map(|auth| auth.actor)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(_) => Some(AuthContext::from_request_parts(parts, state).await?),
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Admin authentication context - requires the Admin role in the token
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub actor: Actor,
    pub claims: TokenClaims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { actor, claims } = AuthContext::from_request_parts(parts, state).await?;

        if let Err(e) = actor.require_admin() {
            tracing::warn!(principal_id = actor.principal_id, role = %actor.role, "admin route refused");
            return Err(e);
        }

        Ok(AdminAuthContext { actor, claims })
    }
}
