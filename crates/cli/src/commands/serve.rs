//! `intervet serve` — Start the HTTP API server.

use std::path::Path;

use intervet_config::AppConfig;
use tracing::info;

pub async fn run(
    config_path: &Path,
    port_override: Option<u16>,
    seed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.server.port = port;
    }

    println!("Intervet interview server");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Database:  {}", config.database_url);
    println!("   LM model:  {}", config.lm.model);

    info!(
        host = %config.server.host,
        port = config.server.port,
        seed,
        "starting interview server"
    );
    intervet_gateway::start(config, seed).await?;

    Ok(())
}
