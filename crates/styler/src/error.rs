//! Styler error types.
//!
//! Errors are reported per node and joined into a single
//! [`StylerError::Aggregate`] so one broken node never hides the others.

use crate::label::LabelError;
use thiserror::Error;

/// Errors that can occur while applying configuration or engaging clusters.
#[derive(Debug, Error)]
pub enum StylerError {
    /// Node selector cannot be turned into a predicate
    #[error("Invalid selector for node {node}: {message}")]
    InvalidSelector {
        /// Node the selector belongs to
        node: String,
        /// What is wrong with it
        message: String,
    },

    /// Label template of a node failed to compile
    #[error("Invalid label for node {node}: {source}")]
    Label {
        /// Node the label belongs to
        node: String,
        /// Underlying expression error
        #[source]
        source: LabelError,
    },

    /// A watcher could not be engaged with a cluster
    #[error("Failed to engage cluster {cluster} for {watcher}: {message}")]
    Engage {
        /// Cluster being engaged
        cluster: String,
        /// Watcher that failed
        watcher: String,
        /// Reason
        message: String,
    },

    /// Several independent failures
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<StylerError>),
}

impl StylerError {
    /// Join errors into one, `Ok` when there are none.
    ///
    /// A single error is returned as is rather than wrapped.
    pub fn join(mut errors: Vec<StylerError>) -> Result<(), StylerError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(StylerError::Aggregate(errors)),
        }
    }

    /// Number of leaf errors contained
    pub fn count(&self) -> usize {
        match self {
            StylerError::Aggregate(errors) => errors.iter().map(StylerError::count).sum(),
            _ => 1,
        }
    }
}

fn join_messages(errors: &[StylerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
