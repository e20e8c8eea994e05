//! `flame serve`

use anyhow::Result;

use flame::config::FlameConfig;

pub async fn cmd_serve(config: FlameConfig) -> Result<()> {
    if let Some(source) = &config.source {
        tracing::info!(config = %source.display(), "loaded configuration");
    }
    flame::server::start_server(config).await
}
