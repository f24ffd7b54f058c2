use anyhow::Result;
use shopgate::config::Config;
use shopgate::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration from flags and environment
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("shopgate={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting shopgate service");
    tracing::info!(
        bind_addr = %config.bind_addr,
        window_secs = config.rate_limit_window_secs,
        max_requests = config.rate_limit_max_requests,
        api_prefix = %config.api_prefix,
        "Configuration loaded"
    );
    if config.trust_forwarded_for && config.trusted_proxies.is_empty() {
        tracing::warn!("X-Forwarded-For is trusted from every peer; set TRUSTED_PROXIES behind a proxy");
    }
    if config.admin_routes {
        tracing::warn!("Operator reset routes are enabled and unauthenticated");
    }

    // Create and run the server
    let server = Server::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
