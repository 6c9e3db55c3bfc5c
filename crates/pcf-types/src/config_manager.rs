use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

const APP_DIR_NAME: &str = "pcf-samples";

/// Get the user data directory for the samples
/// - macOS: ~/.pcf-samples/
/// - Windows: %APPDATA%\pcf-samples\
/// - Linux: ~/.config/pcf-samples/
pub fn get_user_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?;
        Ok(home.join(format!(".{}", APP_DIR_NAME)))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Failed to get AppData directory"))?;
        Ok(appdata.join(APP_DIR_NAME))
    }

    #[cfg(target_os = "linux")]
    {
        let config =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))?;
        Ok(config.join(APP_DIR_NAME))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        Err(anyhow::anyhow!("Unsupported platform"))
    }
}

/// Ensure the user data directory exists
pub fn ensure_user_data_dir() -> Result<PathBuf> {
    let dir = get_user_data_dir()?;
    if !dir.exists() {
        log::info!("Creating user data directory: {:?}", dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }
    Ok(dir)
}

fn fallback_data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(APP_DIR_NAME);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        log::warn!("Failed to create fallback data directory {:?}: {}", dir, e);
    }
    dir
}

pub fn user_data_dir_or_temp() -> PathBuf {
    match ensure_user_data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::warn!("Failed to resolve user data directory: {}", e);
            fallback_data_dir()
        }
    }
}

/// Write `default_config_content` to `path` unless a file is already there
pub fn ensure_default_config_at(path: &Path, default_config_content: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    std::fs::write(path, default_config_content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

pub fn get_user_config_path_or_temp() -> PathBuf {
    user_data_dir_or_temp().join("config.json")
}

/// Read and parse a config file
pub fn load_config_from(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: Config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    log::info!("Loaded config from {:?}", path);
    Ok(config)
}
