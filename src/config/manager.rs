//! Configuration manager for loading runtime options
//!
//! Options are read from an optional JSON file. The file is never written: target
//! values are not persisted across restarts.

use crate::config::models::SyncConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "CAMSYNC_CONFIG";

/// Configuration manager
pub struct ConfigManager;

impl ConfigManager {
    /// Resolve the configuration file path
    ///
    /// An explicit path wins over `CAMSYNC_CONFIG`. Returns `None` when neither is set.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
    }

    /// Load configuration from `path`
    ///
    /// If the file doesn't exist or is corrupt, returns the default configuration.
    /// A file that parses but fails validation is an error.
    pub fn load_from(path: &Path) -> Result<SyncConfig> {
        if !path.exists() {
            info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(SyncConfig::default());
        }

        let json = std::fs::read_to_string(path)?;

        let config = match serde_json::from_str::<SyncConfig>(&json) {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to parse configuration {}, using defaults: {}",
                    path.display(),
                    e
                );
                SyncConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the resolved path, or defaults when there is none
    pub fn load(explicit: Option<&Path>) -> Result<SyncConfig> {
        match Self::resolve_path(explicit) {
            Some(path) => Self::load_from(&path),
            None => Ok(SyncConfig::default()),
        }
    }
}
