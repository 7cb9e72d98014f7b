//! ConfigStore - Local Configuration File
//!
//! `config.toml` in the platform config directory. A missing or blank file
//! yields the defaults; the file is never created implicitly.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::config::AppConfig;
use crate::error::Result;
use crate::helpers::get_or_create_config_dir;

const CONFIG_FILE: &str = "config.toml";

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let path = get_or_create_config_dir()?.join(CONFIG_FILE);

    #[cfg(debug_assertions)]
    tracing::info!("Config file: {}", path.display());

    Ok(path)
}

/// Load the application configuration
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Save the application configuration
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let value = fs::read_to_string(path)?;
    if value.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let config: AppConfig = toml::from_str(&value)?;
    if let Some(profile) = &config.profile {
        profile.validate()?;
    }
    Ok(config)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
