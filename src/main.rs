/// Coachhub - coaching marketplace core service
///
/// Signed session tokens with server-side revocation, role derivation from
/// memberships, content moderation and client access requests.

mod account;
mod api;
mod auth;
mod config;
mod content;
mod context;
mod db;
mod error;
mod moderation;
mod server;
mod subscription;

#[cfg(test)]
mod test_support;

use config::ServerConfig;
use context::AppContext;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "coachhub={level},tower_http={level}",
            level = config.logging.level
        ))
    });
    let json = config.logging.json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting coachhub");

    // Create application context
    let ctx = AppContext::new(config).await?;
    ctx.bootstrap_admin().await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
