use anyhow::Result;
use tracing::{info, warn};

use solana_pool_pilot::utils::logger::init_logger;
use solana_pool_pilot::{Config, Engine};

/// Main entry point for the pool strategy engine.
///
/// Loads configuration from the environment, spawns one execution session
/// per configured wallet, and runs until a shutdown signal arrives. Every
/// session trades independently; a failing or rate-limited wallet never
/// blocks the others.
#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    info!("starting solana-pool-pilot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    config.validate()?;

    let engine = Engine::new(config)?;
    engine.run().await?;

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    warn!("shutdown signal received, stopping sessions...");

    engine.stop().await;
    info!("shutdown complete");
    Ok(())
}
