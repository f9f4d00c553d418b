//! YAML parsing of configuration files

use crate::error::ConfigError;
use crate::model::Config;
use std::path::Path;

impl Config {
    /// Parses a YAML document. Unknown fields are rejected and an empty
    /// document yields an empty configuration.
    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    /// Reads and parses a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&data)
    }
}
