//! Configuration errors

use thiserror::Error;

/// Errors that can occur while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path of the file that could not be read
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The YAML document could not be decoded into a `Config`
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// One or more fields failed validation
    #[error("Invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
