//! Configuration view and validation: `flame config`.

use anyhow::Result;

use flame::config::FlameConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config: &FlameConfig, command: Option<ConfigCommands>) -> Result<()> {
    let toml = &config.toml;
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Flame Configuration");
            println!("===================");
            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No flame.toml found, using defaults"),
            }
            println!();

            println!("[server]");
            println!("  host = \"{}\"", toml.server.host);
            println!("  port = {}", toml.server.port);
            println!("  dev_mode = {}", toml.server.dev_mode);
            if let Some(dir) = &toml.server.public_dir {
                println!("  public_dir = \"{}\"", dir.display());
            }
            println!();

            println!("[storage]");
            println!("  data_dir = \"{}\"", toml.storage.data_dir.display());
            println!();

            println!("[auth]");
            let token = if toml.auth.token.is_some() { "(set)" } else { "(unset)" };
            println!("  token = {}", token);
            println!();

            println!("[integrations]");
            println!(
                "  refresh_interval_secs = {}",
                toml.integrations.refresh_interval_secs
            );
            println!();

            println!("[log]");
            println!("  format = \"{:?}\"", toml.log.format);
            if let Some(dir) = &toml.log.dir {
                println!("  dir = \"{}\"", dir.display());
            }
            if let Some(filter) = &toml.log.filter {
                println!("  filter = \"{}\"", filter);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }
    Ok(())
}
