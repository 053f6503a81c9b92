//! Configuration loading utilities for CLI commands

use anyhow::{bail, Context, Result};
use dicomesh_core::config::{CliConfigOverrides, LayeredConfig, CONFIG_FILE};
use std::path::Path;

/// Load defaults, then the config file, then the environment, then CLI flags.
///
/// An explicitly named file must exist; the default `dicomesh.toml` in the
/// working directory is optional.
pub fn load_config(path: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let config = match path {
        Some(path) => {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            LayeredConfig::with_defaults()
                .load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => LayeredConfig::with_defaults()
            .load_from_optional_file(CONFIG_FILE)
            .context("Failed to load configuration file")?,
    };

    let mut config = config.load_from_env();
    config.update_from_cli(overrides);
    Ok(config)
}
