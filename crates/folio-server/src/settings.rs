//! Layered configuration: optional TOML file, then `FOLIO__*` environment variables

use config::{Config, ConfigError, Environment, File};
use folio_core::{ServerConfig, WorkerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FOLIO_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load from `$FOLIO_CONFIG`, else `<config dir>/folio/config.toml` if present.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("FOLIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("folio").join("config.toml"))
}
