//! Locating and loading the engine configuration and data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regionmark_core::EngineConfig;

/// `$XDG_CONFIG_HOME/regionmark/config.json`, falling back to `~/.config`
pub fn default_config_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    config_dir.join("regionmark").join("config.json")
}

/// Platform data directory for images and annotations
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("regionmark")
}

/// Load the configuration. An explicitly named file must exist; the default
/// location may be absent, in which case defaults apply. A file that exists
/// but does not parse is always an error.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound && explicit.is_none() => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(EngineConfig::default());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read config {:?}", path)),
    };
    let config = EngineConfig::from_json(&content).with_context(|| format!("Malformed config {:?}", path))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}
