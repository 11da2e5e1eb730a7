//! Session token issuance, validation and revocation.
//!
//! Tokens are HS256 JWTs carrying a unique `jti`. Revocation stores the `jti`
//! in the `revoked_token` table; validation checks signature and structure,
//! then expiry, then the revocation set.

use crate::auth::roles::Role;
use crate::config::AuthConfig;
use crate::error::{HubError, HubResult};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Identity snapshot embedded in a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub principal_id: i64,
    pub role: Role,
    pub display_name: String,
}

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "sub")]
    pub principal_id: i64,
    pub role: Role,
    #[serde(rename = "name")]
    pub display_name: String,
    pub jti: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

/// Signed token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct TokenService {
    db: SqlitePool,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("validation", &self.validation)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(db: SqlitePool, config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.token_leeway_secs;

        Self {
            db,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            default_ttl: Duration::seconds(config.token_ttl_secs),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a new token with a fresh `jti`. Performs no storage access.
    pub fn issue(&self, claims: SessionClaims, ttl: Duration) -> HubResult<IssuedToken> {
        // JWT timestamps carry whole seconds only
        let now = Utc::now().trunc_subsecs(0);
        let claims = TokenClaims {
            principal_id: claims.principal_id,
            role: claims.role,
            display_name: claims.display_name,
            jti: Uuid::new_v4().to_string(),
            issued_at: now,
            expires_at: now + ttl,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| HubError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify a token and return its claims.
    pub async fn validate(&self, token: &str) -> HubResult<TokenClaims> {
        let claims = self.decode_with(token, &self.validation)?;

        if self.is_revoked(&claims.jti).await? {
            tracing::debug!(jti = %claims.jti, "rejected revoked token");
            return Err(HubError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Add a `jti` to the revocation set. Revoking twice is a no-op.
    pub async fn revoke(&self, jti: &str) -> HubResult<()> {
        sqlx::query(
            "INSERT INTO revoked_token (jti, revoked_at) VALUES (?1, ?2) ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        tracing::info!(jti = %jti, "token revoked");
        Ok(())
    }

    /// Revoke the token itself, which must carry a valid signature.
    /// Expired tokens are accepted so logout never fails on an old session.
    pub async fn revoke_token(&self, token: &str) -> HubResult<TokenClaims> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;

        let claims = self.decode_with(token, &validation)?;
        self.revoke(&claims.jti).await?;
        Ok(claims)
    }

    pub async fn is_revoked(&self, jti: &str) -> HubResult<bool> {
        let revoked: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM revoked_token WHERE jti = ?1)")
                .bind(jti)
                .fetch_one(&self.db)
                .await?;

        Ok(revoked != 0)
    }

    fn decode_with(&self, token: &str, validation: &Validation) -> HubResult<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => HubError::TokenExpired,
                ErrorKind::InvalidSignature => HubError::InvalidSignature,
                _ => {
                    tracing::debug!(error = %e, "token decode failed");
                    HubError::MalformedToken(e.to_string())
                }
            })
    }
}
