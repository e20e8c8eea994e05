//! Data directory bootstrap: `flame init`.

use anyhow::{Context, Result};

use flame::config::{CONFIG_FILE_NAME, FlameConfig, FlameToml};
use flame::server::db::FlameDb;

pub fn cmd_init(config: &FlameConfig) -> Result<()> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    std::fs::create_dir_all(config.uploads_dir())?;

    let db_path = config.db_path();
    let db = FlameDb::new(&db_path)?;
    let seeded = db.seed_default_settings()?;

    println!();
    println!("Database: {}", db_path.display());
    if seeded > 0 {
        println!("  seeded {} default settings", seeded);
    }

    let config_path = data_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        println!("Config:   {} (kept)", config_path.display());
    } else {
        let mut toml = FlameToml::default();
        toml.storage.data_dir = data_dir.to_path_buf();
        toml.save(&config_path)?;
        println!("Config:   {} (created)", config_path.display());
    }
    println!();
    println!("Run 'flame serve --data-dir {}' to start.", data_dir.display());
    println!();
    Ok(())
}
