mod server;

use anyhow::Result;
use tracing::info;

use huddle_core::{
    bootstrap::{init_database, init_services, load_config},
    logging,
};

use server::HuddleServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration (fail fast on misconfigurations)
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Huddle server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize database
    let pool = init_database(&config).await?;

    // 4. Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        anyhow::anyhow!("Migration failed: {e}")
    })?;
    info!("Migrations completed");

    // 5. Initialize core services
    let services = init_services(pool, &config)?;

    // 6. Initialize the SFU
    let sfu = huddle_sfu::SfuService::new(huddle_sfu::SfuConfig {
        stun_servers: config.webrtc.stun_servers.clone(),
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize SFU: {e}"))?;

    // 7. Start the server
    let server = HuddleServer::new(config, services, sfu);
    server.start().await?;

    Ok(())
}
