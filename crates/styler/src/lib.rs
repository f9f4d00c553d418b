//! Diagram styling engine
//!
//! Turns a [`Config`] of diagram nodes into live watches on one or more
//! clusters and keeps a styling block for the diagram current:
//!
//! ```text
//! style db stroke:#00FF00
//! db[replicas: 2]
//! style api stroke:#808080
//! ```
//!
//! Clusters are announced through the [`Multiplexer`]; configuration is
//! applied with [`Styler::update_config`]; the rendered block is read with
//! [`Styler::get_styling`] and changes are signalled through
//! [`Styler::subscribe`].
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{clusters_from_default_kubeconfig, ClusterClient};
//! use diagram_config::Config;
//! use std::sync::Arc;
//! use styler::{Multiplexer, Styler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let multiplexer = Arc::new(Multiplexer::new());
//! for cluster in clusters_from_default_kubeconfig().await? {
//!     let name = cluster.name().to_string();
//!     multiplexer.engage(name, Arc::new(cluster))?;
//! }
//!
//! let styler = Styler::new(Arc::clone(&multiplexer));
//! styler.update_config(&Config::from_file("config.yaml")?)?;
//!
//! let mut changes = styler.subscribe();
//! while changes.changed().await.is_ok() {
//!     println!("{}", styler.get_styling());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod label;
pub mod multiplexer;
pub mod reconciler;
pub mod registry;
pub mod resources;
pub mod selector;
pub mod status;
pub mod styling;
pub mod watches;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::StylerError;
pub use label::{CelEvaluator, LabelError, LabelEvaluator, LabelProgram};
pub use multiplexer::{ClusterAware, Multiplexer};
pub use reconciler::NodeWatcher;
pub use registry::ClusterRegistry;
pub use resources::{ResourceKey, ResourceTracker};
pub use selector::ResourcePredicate;
pub use status::{ResourceState, compute_status};
pub use styling::{StyleFragment, Styling};
pub use watches::{WatchManager, WatchStats, hash_node};

use diagram_config::Config;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Entry point of the engine.
///
/// Dropping the styler stops all of its watchers.
#[derive(Debug)]
pub struct Styler {
    multiplexer: Arc<Multiplexer>,
    styling: Arc<Styling>,
    watches: WatchManager,
}

impl Styler {
    /// Create a styler evaluating labels as CEL
    pub fn new(multiplexer: Arc<Multiplexer>) -> Self {
        Self::with_evaluator(multiplexer, Arc::new(CelEvaluator::new()))
    }

    /// Create a styler with a custom label evaluator
    pub fn with_evaluator(multiplexer: Arc<Multiplexer>, evaluator: Arc<dyn LabelEvaluator>) -> Self {
        let styling = Arc::new(Styling::new());
        let watches = WatchManager::new(
            Arc::clone(&multiplexer),
            evaluator,
            Arc::clone(&styling),
            CancellationToken::new(),
        );
        Self {
            multiplexer,
            styling,
            watches,
        }
    }

    /// Apply a full configuration.
    ///
    /// Safe to call repeatedly; nodes whose definition did not change keep
    /// running. Per-node failures are joined into the returned error.
    pub fn update_config(&self, config: &Config) -> Result<(), StylerError> {
        self.watches.set_style(&config.style);
        self.watches.update(&config.nodes)
    }

    /// Current styling block
    pub fn get_styling(&self) -> String {
        self.styling.render()
    }

    /// Signal fired after every change of the styling block.
    ///
    /// Bursts may coalesce into one notification.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.styling.subscribe()
    }

    /// Multiplexer clusters are announced to
    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    /// Watch manager, for inspection
    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    /// Stop all watchers
    pub fn shutdown(&self) {
        self.watches.shutdown();
    }
}

impl Drop for Styler {
    fn drop(&mut self) {
        self.watches.shutdown();
    }
}
