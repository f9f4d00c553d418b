//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to a cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested kind is not served by the cluster
    #[error("Discovery failed for {kind}: {message}")]
    Discovery {
        /// Kind that could not be resolved
        kind: String,
        /// Reason reported by discovery
        message: String,
    },

    /// Kubeconfig could not be read or turned into a client config
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Watch stream error
    #[error("Watch failed: {0}")]
    Watch(String),
}

impl ClusterError {
    /// Whether this error means the requested resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

impl From<kube_runtime::watcher::Error> for ClusterError {
    fn from(error: kube_runtime::watcher::Error) -> Self {
        ClusterError::Watch(error.to_string())
    }
}
