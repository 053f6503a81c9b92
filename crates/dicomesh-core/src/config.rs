use crate::error::{DicomeshError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "dicomesh.toml";

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for dicomesh
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// One sub-directory per conversion job lives here
    pub conversions_root: ConfigValue<PathBuf>,
    /// Bundled sample series, one sub-directory each
    pub samples_root: ConfigValue<PathBuf>,
    /// Executable name looked up on PATH
    pub tool_name: ConfigValue<String>,
    /// Project-local executable used when PATH has none
    pub tool_fallback: ConfigValue<PathBuf>,
    /// Number of runs shown by `history`
    pub recent_limit: ConfigValue<usize>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            conversions_root: ConfigValue::new(
                PathBuf::from(".cache/dicom_sessions"),
                ConfigSource::Default,
            ),
            samples_root: ConfigValue::new(
                PathBuf::from("dcm_examples/big_dicom"),
                ConfigSource::Default,
            ),
            tool_name: ConfigValue::new("dicom2stl".to_string(), ConfigSource::Default),
            tool_fallback: ConfigValue::new(
                PathBuf::from("venv/bin/dicom2stl"),
                ConfigSource::Default,
            ),
            recent_limit: ConfigValue::new(5, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| DicomeshError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| DicomeshError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(root) = file_config.conversions_root {
            self.conversions_root.update(root, ConfigSource::File);
        }

        if let Some(root) = file_config.samples_root {
            self.samples_root.update(root, ConfigSource::File);
        }

        if let Some(name) = file_config.tool_name {
            self.tool_name.update(name, ConfigSource::File);
        }

        if let Some(fallback) = file_config.tool_fallback {
            self.tool_fallback.update(fallback, ConfigSource::File);
        }

        if let Some(limit) = file_config.recent_limit {
            self.recent_limit.update(limit, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load the file only when it exists
    pub fn load_from_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        if path.as_ref().is_file() {
            self.load_from_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Ok(root) = env::var("DICOMESH_CONVERSIONS_ROOT") {
            self.conversions_root.update(PathBuf::from(root), ConfigSource::Environment);
        }

        if let Ok(root) = env::var("DICOMESH_SAMPLES_ROOT") {
            self.samples_root.update(PathBuf::from(root), ConfigSource::Environment);
        }

        if let Ok(name) = env::var("DICOMESH_TOOL") {
            if name.trim().is_empty() {
                tracing::warn!("Ignoring empty DICOMESH_TOOL value");
            } else {
                self.tool_name.update(name, ConfigSource::Environment);
            }
        }

        if let Ok(fallback) = env::var("DICOMESH_TOOL_FALLBACK") {
            self.tool_fallback.update(PathBuf::from(fallback), ConfigSource::Environment);
        }

        if let Ok(limit_str) = env::var("DICOMESH_RECENT_LIMIT") {
            match parse_recent_limit(&limit_str) {
                Ok(limit) => self.recent_limit.update(limit, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid DICOMESH_RECENT_LIMIT value '{}': expected a positive integer",
                    limit_str
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(root) = overrides.conversions_root {
            self.conversions_root.update(root, ConfigSource::Cli);
        }

        if let Some(root) = overrides.samples_root {
            self.samples_root.update(root, ConfigSource::Cli);
        }

        if let Some(name) = overrides.tool_name {
            self.tool_name.update(name, ConfigSource::Cli);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "conversions_root".to_string(),
            (
                self.conversions_root.value.display().to_string(),
                self.conversions_root.source,
            ),
        );

        map.insert(
            "samples_root".to_string(),
            (self.samples_root.value.display().to_string(), self.samples_root.source),
        );

        map.insert("tool_name".to_string(), (self.tool_name.value.clone(), self.tool_name.source));

        map.insert(
            "tool_fallback".to_string(),
            (self.tool_fallback.value.display().to_string(), self.tool_fallback.source),
        );

        map.insert(
            "recent_limit".to_string(),
            (self.recent_limit.value.to_string(), self.recent_limit.source),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    conversions_root: Option<PathBuf>,
    samples_root: Option<PathBuf>,
    tool_name: Option<String>,
    tool_fallback: Option<PathBuf>,
    recent_limit: Option<usize>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub conversions_root: Option<PathBuf>,
    pub samples_root: Option<PathBuf>,
    pub tool_name: Option<String>,
}

/// Parse the history length from string
pub fn parse_recent_limit(s: &str) -> Result<usize> {
    match s.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(DicomeshError::ConfigInvalid {
            key: "recent_limit".to_string(),
            reason: format!("Invalid recent limit: {}. Use a positive integer", s),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LayeredConfig::with_defaults();
        assert_eq!(config.conversions_root.value, PathBuf::from(".cache/dicom_sessions"));
        assert_eq!(config.conversions_root.source, ConfigSource::Default);
        assert_eq!(config.tool_name.value, "dicom2stl");
        assert_eq!(config.recent_limit.value, 5);
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);
        assert_eq!(value.source, ConfigSource::File);

        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);

        value.update(400, ConfigSource::Cli);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Cli);

        // Lower precedence should not override
        value.update(500, ConfigSource::File);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
conversions_root = "/data/conversions"
tool_name = "dicom2stl-dev"
recent_limit = 12
"#
        )
        .unwrap();

        let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(config.conversions_root.value, PathBuf::from("/data/conversions"));
        assert_eq!(config.conversions_root.source, ConfigSource::File);
        assert_eq!(config.tool_name.value, "dicom2stl-dev");
        assert_eq!(config.recent_limit.value, 12);
        assert_eq!(config.samples_root.source, ConfigSource::Default);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "recent_limit = \"many\"").unwrap();

        let err = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, DicomeshError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_optional_file_missing() {
        let config = LayeredConfig::with_defaults()
            .load_from_optional_file("/definitely/not/here/dicomesh.toml")
            .unwrap();
        assert_eq!(config.tool_name.source, ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = LayeredConfig::with_defaults();

        config.update_from_cli(CliConfigOverrides {
            conversions_root: Some(PathBuf::from("/tmp/conv")),
            samples_root: None,
            tool_name: None,
        });

        assert_eq!(config.conversions_root.value, PathBuf::from("/tmp/conv"));
        assert_eq!(config.conversions_root.source, ConfigSource::Cli);
        assert_eq!(config.samples_root.source, ConfigSource::Default);
    }

    #[test]
    fn test_parse_recent_limit() {
        assert_eq!(parse_recent_limit("10").unwrap(), 10);
        assert_eq!(parse_recent_limit(" 3 ").unwrap(), 3);
        assert!(parse_recent_limit("0").is_err());
        assert!(parse_recent_limit("ten").is_err());
    }

    #[test]
    fn test_inspection_map() {
        let map = LayeredConfig::with_defaults().to_inspection_map();

        assert!(map.contains_key("conversions_root"));
        assert!(map.contains_key("tool_fallback"));
        let (tool, source) = &map["tool_name"];
        assert_eq!(tool, "dicom2stl");
        assert_eq!(*source, ConfigSource::Default);
    }
}
