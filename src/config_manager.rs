use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pcf_types::Config;
use pcf_types::config_manager::{
    ensure_default_config_at, ensure_user_data_dir, get_user_config_path_or_temp,
    load_config_from,
};

/// Default config.json content embedded in the binary
pub const DEFAULT_CONFIG: &str = include_str!("../config.default.json");

pub fn default_config() -> Result<Config> {
    serde_json::from_str(DEFAULT_CONFIG).context("Invalid embedded default config")
}

/// Initialize user config directory and config file
/// If config file doesn't exist, create it from the embedded default config
pub fn initialize_user_config() -> Result<PathBuf> {
    let config_path = ensure_user_data_dir()?.join("config.json");

    if !config_path.exists() {
        log::info!(
            "Config file not found, creating from embedded default: {:?}",
            config_path
        );
        ensure_default_config_at(&config_path, DEFAULT_CONFIG)?;
    } else {
        log::info!("Using existing config file: {:?}", config_path);
    }

    Ok(config_path)
}

/// Resolve the config path: an explicit path wins, then the user data
/// directory, then a temp directory fallback
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    match initialize_user_config() {
        Ok(path) => path,
        Err(e) => {
            log::warn!("Failed to initialize user config: {:#}", e);
            let fallback = get_user_config_path_or_temp();
            if let Err(err) = ensure_default_config_at(&fallback, DEFAULT_CONFIG) {
                log::warn!(
                    "Failed to create fallback config at {}: {:#}",
                    fallback.display(),
                    err
                );
            }
            fallback
        }
    }
}

/// Load the config at `path`, falling back to the embedded default when the
/// file is missing or invalid
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    match load_config_from(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            log::warn!("{:#}; using embedded default config", e);
            default_config()
        }
    }
}
