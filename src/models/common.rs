//! Shared helpers for configuration files.

use super::level::ConfigError;
use std::fs;
use std::path::Path;

/// Load a TOML file and deserialize it
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(data) => Ok(data),
        Err(e) => {
            log::error!("CONFIG: Failed to parse TOML file {:?}: {}", path, e);
            Err(e.into())
        }
    }
}
