/// Application context and dependency injection
use crate::{
    account::AccountManager,
    auth::TokenService,
    config::ServerConfig,
    content::ContentStore,
    db,
    error::{HubError, HubResult},
    moderation::ModerationManager,
    subscription::SubscriptionManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub token_service: Arc<TokenService>,
    pub account_manager: Arc<AccountManager>,
    pub content_store: Arc<ContentStore>,
    pub moderation_manager: Arc<ModerationManager>,
    pub subscription_manager: Arc<SubscriptionManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> HubResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    HubError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire every service onto an already migrated pool
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let config = Arc::new(config);
        let token_service = Arc::new(TokenService::new(pool.clone(), &config.authentication));
        let account_manager = Arc::new(AccountManager::new(
            pool.clone(),
            config.clone(),
            token_service.clone(),
        ));

        Self {
            content_store: Arc::new(ContentStore::new(pool.clone())),
            moderation_manager: Arc::new(ModerationManager::new(pool.clone())),
            subscription_manager: Arc::new(SubscriptionManager::new(pool.clone())),
            config,
            db: pool,
            token_service,
            account_manager,
        }
    }

    /// Create the configured admin account when a bootstrap password is set
    pub async fn bootstrap_admin(&self) -> HubResult<()> {
        match &self.config.authentication.admin_bootstrap_password {
            Some(password) => {
                self.account_manager
                    .ensure_admin(&self.config.authentication.admin_email, password)
                    .await?;
            }
            None => tracing::debug!("no admin bootstrap password configured"),
        }
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
