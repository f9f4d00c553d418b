//! Controller-specific error types.

use cluster_client::ClusterError;
use diagram_config::ConfigError;
use std::path::PathBuf;
use styler::StylerError;
use thiserror::Error;

/// Errors that can occur in the Diagram Live controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Loading clusters failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Applying configuration failed
    #[error("Styler error: {0}")]
    Styler(#[from] StylerError),

    /// Configuration file could not be loaded
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing a file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Input files could not be watched
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Generated configuration could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// Invalid controller settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background task failed
    #[error("Task failed: {0}")]
    Task(String),
}
