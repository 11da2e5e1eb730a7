//! Shared fixtures for unit tests.

use crate::config::{
    AuthConfig, LockoutConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig,
};
use crate::db;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

pub const TEST_SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";
pub const ADMIN_EMAIL: &str = "admin@test.local";

/// In-memory database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database, so
/// code under test must never touch the pool while holding a transaction.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 8080,
        },
        storage: StorageConfig {
            data_directory: "/tmp/coachhub-test".into(),
            database: "/tmp/coachhub-test/coachhub.sqlite".into(),
        },
        authentication: AuthConfig {
            jwt_secret: TEST_SECRET.to_string(),
            admin_email: ADMIN_EMAIL.to_string(),
            admin_bootstrap_password: None,
            token_ttl_secs: 3600,
            token_leeway_secs: 0,
            allow_registration: true,
        },
        lockout: LockoutConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: false,
        },
    }
}

/// Insert a bare principal; the hash is a placeholder nobody logs in with.
pub async fn insert_principal(pool: &SqlitePool, email: &str) -> i64 {
    sqlx::query(
        "INSERT INTO principal (email, display_name, password_hash, created_at) VALUES (?1, ?2, 'x', ?3)",
    )
    .bind(email)
    .bind(email.split('@').next().unwrap_or(email))
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Give a principal a trainer row, returning the trainer id.
pub async fn make_trainer(pool: &SqlitePool, principal_id: i64) -> i64 {
    sqlx::query("INSERT INTO trainer (principal_id, created_at) VALUES (?1, ?2)")
        .bind(principal_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

/// Give a principal a client row, returning the client id.
pub async fn make_client(pool: &SqlitePool, principal_id: i64) -> i64 {
    sqlx::query("INSERT INTO client (principal_id, created_at) VALUES (?1, ?2)")
        .bind(principal_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}
