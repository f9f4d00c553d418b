//! Fan-out of cluster availability to watchers.
//!
//! The multiplexer owns the [`ClusterRegistry`]. Cluster discovery calls
//! [`Multiplexer::engage`] / [`Multiplexer::disengage`]; node watchers register
//! as [`ClusterAware`] and are told about every cluster, including the ones
//! known before they registered.

use crate::error::StylerError;
use crate::registry::ClusterRegistry;
use cluster_client::ClusterClient;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A component that wants to know which clusters are available.
pub trait ClusterAware: Send + Sync {
    /// A cluster became available or its handle was replaced.
    ///
    /// Must not block; long running work belongs in a spawned task.
    fn engage(&self, name: &str, cluster: Arc<dyn ClusterClient>) -> Result<(), StylerError>;

    /// A cluster went away
    fn disengage(&self, name: &str);
}

/// Connects cluster discovery with watchers.
#[derive(Default)]
pub struct Multiplexer {
    registry: ClusterRegistry,
    // Held while fanning out so registration and engagement never interleave
    watchers: Mutex<BTreeMap<String, Arc<dyn ClusterAware>>>,
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("registry", &self.registry)
            .field("watchers", &self.watchers.lock().len())
            .finish()
    }
}

impl Multiplexer {
    /// Create a multiplexer with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of known clusters
    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Record a cluster and engage every registered watcher with it.
    ///
    /// All watchers are engaged even if some fail; failures are joined.
    pub fn engage(
        &self,
        name: impl Into<String>,
        cluster: Arc<dyn ClusterClient>,
    ) -> Result<(), StylerError> {
        let name = name.into();
        let watchers = self.watchers.lock();

        if self.registry.add_or_replace(name.clone(), Arc::clone(&cluster)).is_some() {
            info!(cluster = %name, "Replacing cluster");
        } else {
            info!(cluster = %name, "Engaging cluster");
        }

        let mut errors = Vec::new();
        for (id, watcher) in watchers.iter() {
            if let Err(e) = watcher.engage(&name, Arc::clone(&cluster)) {
                warn!(cluster = %name, watcher = %id, "Failed to engage watcher: {}", e);
                errors.push(e);
            }
        }
        StylerError::join(errors)
    }

    /// Forget a cluster and tell every watcher to release it
    pub fn disengage(&self, name: &str) {
        let watchers = self.watchers.lock();
        if self.registry.remove(name).is_none() {
            debug!(cluster = %name, "Disengaging unknown cluster");
        } else {
            info!(cluster = %name, "Disengaging cluster");
        }
        for watcher in watchers.values() {
            watcher.disengage(name);
        }
    }

    /// Bring the registry in line with a freshly loaded set of clusters.
    ///
    /// Names no longer present are disengaged, new names are engaged. A name
    /// that is already known keeps its current handle and engagements.
    pub fn sync(&self, clusters: Vec<Arc<dyn ClusterClient>>) -> Result<(), StylerError> {
        let known: BTreeSet<String> = self.registry.names().into_iter().collect();
        let current: BTreeSet<&str> = clusters.iter().map(|c| c.name()).collect();

        for name in known.iter().filter(|name| !current.contains(name.as_str())) {
            self.disengage(name);
        }

        let mut errors = Vec::new();
        for cluster in clusters {
            let name = cluster.name().to_string();
            if known.contains(&name) {
                continue;
            }
            if let Err(e) = self.engage(name, cluster) {
                errors.push(e);
            }
        }
        StylerError::join(errors)
    }

    /// Register a watcher and engage it with every known cluster.
    ///
    /// When any engagement fails the watcher is not registered and the
    /// joined errors are returned, so a later call can retry.
    pub fn register_watcher(
        &self,
        id: impl Into<String>,
        watcher: Arc<dyn ClusterAware>,
    ) -> Result<(), StylerError> {
        let id = id.into();
        let mut watchers = self.watchers.lock();

        let mut errors = Vec::new();
        self.registry.for_each(|name, cluster| {
            if let Err(e) = watcher.engage(name, Arc::clone(cluster)) {
                warn!(cluster = %name, watcher = %id, "Failed to engage watcher: {}", e);
                errors.push(e);
            }
        });
        StylerError::join(errors)?;

        debug!(watcher = %id, "Registered watcher");
        watchers.insert(id, watcher);
        Ok(())
    }

    /// Stop propagating cluster events to a watcher.
    ///
    /// Work already handed to the watcher is not cancelled here.
    pub fn deregister_watcher(&self, id: &str) -> Option<Arc<dyn ClusterAware>> {
        let removed = self.watchers.lock().remove(id);
        if removed.is_some() {
            debug!(watcher = %id, "Deregistered watcher");
        }
        removed
    }

    /// Number of registered watchers
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }
}
