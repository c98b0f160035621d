//! `intervet seed` — Insert demo data into an empty store.

use std::path::Path;

use intervet_config::AppConfig;
use intervet_store::{SqliteStore, seed_defaults};

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let store = SqliteStore::new(&config.database_url).await?;
    seed_defaults(&store).await?;

    let roles = store.list_roles().await?;
    println!("Seed complete: {} role(s) in {}", roles.len(), config.database_url);

    Ok(())
}
