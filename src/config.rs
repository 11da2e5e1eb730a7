/// Configuration management for Coachhub
use crate::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub lockout: LockoutConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Principals logging in with this email resolve to the Admin role
    pub admin_email: String,
    /// Password for bootstrapping the admin account at startup
    pub admin_bootstrap_password: Option<String>,
    /// Lifetime of issued session tokens; bounds the role staleness window
    pub token_ttl_secs: i64,
    /// Clock skew tolerated when checking expiry
    pub token_leeway_secs: u64,
    pub allow_registration: bool,
}

/// Account lockout configuration (disabled unless explicitly enabled)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    pub enabled: bool,
    pub max_failed_attempts: i64,
    pub lockout_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_failed_attempts: 5,
            lockout_minutes: 15,
        }
    }
}

/// Longest accepted session lifetime (30 days)
pub const MAX_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Longest accepted lockout window (30 days)
pub const MAX_LOCKOUT_MINUTES: i64 = 30 * 24 * 60;

/// Longest accepted clock leeway
pub const MAX_TOKEN_LEEWAY_SECS: u64 = 300;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> HubResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("COACHHUB_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("COACHHUB_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| HubError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("COACHHUB_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("COACHHUB_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("coachhub.sqlite"));

        let jwt_secret = env::var("COACHHUB_JWT_SECRET")
            .map_err(|_| HubError::Validation("JWT secret required".to_string()))?;
        let admin_email = env::var("COACHHUB_ADMIN_EMAIL")
            .unwrap_or_else(|_| "admin@test.local".to_string())
            .trim()
            .to_lowercase();
        let admin_bootstrap_password = env::var("COACHHUB_ADMIN_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty());
        let token_ttl_secs = env::var("COACHHUB_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| HubError::Validation("Invalid token TTL".to_string()))?;
        let token_leeway_secs = env::var("COACHHUB_TOKEN_LEEWAY_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| HubError::Validation("Invalid token leeway".to_string()))?;
        let allow_registration = env_flag("COACHHUB_ALLOW_REGISTRATION", true);

        let lockout_defaults = LockoutConfig::default();
        let lockout = LockoutConfig {
            enabled: env_flag("COACHHUB_LOCKOUT_ENABLED", false),
            max_failed_attempts: env::var("COACHHUB_LOCKOUT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(lockout_defaults.max_failed_attempts),
            lockout_minutes: env::var("COACHHUB_LOCKOUT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(lockout_defaults.lockout_minutes),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env_flag("COACHHUB_LOG_JSON", false);

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                admin_email,
                admin_bootstrap_password,
                token_ttl_secs,
                token_leeway_secs,
                allow_registration,
            },
            lockout,
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> HubResult<()> {
        if self.service.hostname.is_empty() {
            return Err(HubError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(HubError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.token_ttl_secs <= 0
            || self.authentication.token_ttl_secs > MAX_TOKEN_TTL_SECS
        {
            return Err(HubError::Validation(format!(
                "Token TTL must be between 1 and {} seconds",
                MAX_TOKEN_TTL_SECS
            )));
        }

        if self.authentication.token_leeway_secs > MAX_TOKEN_LEEWAY_SECS {
            return Err(HubError::Validation(format!(
                "Token leeway cannot exceed {} seconds",
                MAX_TOKEN_LEEWAY_SECS
            )));
        }

        if !self.authentication.admin_email.contains('@') {
            return Err(HubError::Validation("Admin email is invalid".to_string()));
        }

        if self.lockout.enabled
            && (self.lockout.max_failed_attempts <= 0 || self.lockout.lockout_minutes <= 0)
        {
            return Err(HubError::Validation(
                "Lockout threshold and duration must be positive when lockout is enabled"
                    .to_string(),
            ));
        }

        if self.lockout.lockout_minutes > MAX_LOCKOUT_MINUTES {
            return Err(HubError::Validation(format!(
                "Lockout duration cannot exceed {} minutes",
                MAX_LOCKOUT_MINUTES
            )));
        }

        Ok(())
    }
}
