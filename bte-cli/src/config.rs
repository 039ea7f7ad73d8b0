//! Configuration loading and parsing

use anyhow::{Context, Result};
use bte_codec::{CalibrationRun, InitParams, MessageCatalog, TransportConfig};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; a missing section uses the device defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// CAN adapter settings
    pub can: TransportConfig,
    /// Catalog file replacing the built-in one
    pub catalog: Option<PathBuf>,
    pub initialization: InitParams,
    pub calibration: CalibrationRun,
}

impl AppConfig {
    /// Resolve the catalog: `--catalog` wins over the config file, which wins
    /// over the built-in catalog
    pub fn load_catalog(&self, cli_override: Option<&Path>) -> Result<Cow<'static, MessageCatalog>> {
        match cli_override.or(self.catalog.as_deref()) {
            Some(path) => {
                let catalog = MessageCatalog::from_file(path)
                    .with_context(|| format!("Failed to load catalog: {:?}", path))?;
                Ok(Cow::Owned(catalog))
            }
            None => Ok(Cow::Borrowed(MessageCatalog::builtin())),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
