// Configuration loader
// Loads settings from an explicit path, ~/.nudge/config.toml, or defaults

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;

/// Load configuration.
///
/// An explicit path must exist. Without one, `~/.nudge/config.toml` is used
/// when present, otherwise built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            load_from_file(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => load_from_file(&path)?,
            _ => Config::default(),
        },
    };

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

/// Parse a TOML file; missing sections and fields fall back to defaults
pub fn load_from_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".nudge").join("config.toml"))
}
