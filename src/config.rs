//! Process configuration for the Flame server.
//!
//! Read from `<data_dir>/flame.toml` (or `--config`), then overridden by
//! environment variables, then by CLI flags. Runtime feature toggles such as
//! ordering or Docker discovery are not here; they live in the database
//! config table (see [`crate::settings`]).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5005
//! dev_mode = false
//! public_dir = "public"
//!
//! [storage]
//! data_dir = "data"
//!
//! [auth]
//! token = "change-me"
//!
//! [integrations]
//! refresh_interval_secs = 60
//!
//! [log]
//! format = "json"
//! dir = "data/logs"
//! filter = "flame=debug"
//! ```
//!
//! | Variable           | Overrides                |
//! |--------------------|--------------------------|
//! | `FLAME_HOST`       | `server.host`            |
//! | `FLAME_PORT`       | `server.port`            |
//! | `FLAME_DATA_DIR`   | `storage.data_dir`       |
//! | `FLAME_API_TOKEN`  | `auth.token`             |
//! | `FLAME_LOG_FORMAT` | `log.format`             |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "flame.toml";
pub const DEFAULT_PORT: u16 = 5005;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Permissive CORS for a separately served frontend.
    pub dev_mode: bool,
    /// Directory holding a built frontend; served with SPA fallback when set.
    pub public_dir: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            dev_mode: false,
            public_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSection {
    /// Pre-shared API token. When unset every caller is treated as authenticated.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntegrationsSection {
    /// Background refresh period. `0` refreshes only when categories are listed.
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSection {
    pub format: LogFormat,
    /// Daily-rolling log files are written here when set.
    pub dir: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlameToml {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub auth: AuthSection,
    pub integrations: IntegrationsSection,
    pub log: LogSection,
}

impl FlameToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse flame.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize flame.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FLAME_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FLAME_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid FLAME_PORT '{}'", port))?;
        }
        if let Some(dir) = lookup("FLAME_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(token) = lookup("FLAME_API_TOKEN") {
            self.auth.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(format) = lookup("FLAME_LOG_FORMAT") {
            self.log.format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.server.port == 0 {
            warnings.push("server.port is 0; an ephemeral port will be chosen".to_string());
        }
        if self.server.host.parse::<std::net::IpAddr>().is_err() && self.server.host != "localhost"
        {
            warnings.push(format!(
                "server.host '{}' is not an IP address or localhost",
                self.server.host
            ));
        }
        if let Some(token) = &self.auth.token
            && token.len() < 12
        {
            warnings.push("auth.token is shorter than 12 characters".to_string());
        }
        if self.auth.token.is_none() {
            warnings.push("auth.token is unset; every caller can modify data".to_string());
        }
        if let Some(dir) = &self.server.public_dir
            && !dir.is_dir()
        {
            warnings.push(format!("server.public_dir {} does not exist", dir.display()));
        }
        warnings
    }
}

/// Values passed on the command line. `None` leaves the lower layers in place.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub dev: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct FlameConfig {
    pub toml: FlameToml,
    /// File the values were read from, if one existed.
    pub source: Option<PathBuf>,
}

impl FlameConfig {
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        Self::resolve_with(cli, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(cli: &CliOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| lookup("FLAME_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| StorageSection::default().data_dir);
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));

        let (mut toml, source) = if path.exists() {
            (FlameToml::load(&path)?, Some(path))
        } else if cli.config.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            (FlameToml::default(), None)
        };

        toml.apply_env(&lookup)?;

        if let Some(host) = &cli.host {
            toml.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            toml.server.port = port;
        }
        if let Some(dir) = &cli.data_dir {
            toml.storage.data_dir = dir.clone();
        }
        if cli.dev {
            toml.server.dev_mode = true;
        }

        Ok(Self { toml, source })
    }

    pub fn data_dir(&self) -> &Path {
        &self.toml.storage.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("db.sqlite")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.toml.server.host, self.toml.server.port)
    }
}
