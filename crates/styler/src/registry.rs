//! Named cluster handles.

use cluster_client::{ClusterClient, ClusterError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Thread-safe map of cluster name to cluster handle.
///
/// Reads never block on each other; a mutation holds the write lock only for
/// the map update itself.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<BTreeMap<String, Arc<dyn ClusterClient>>>,
}

impl std::fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("clusters", &self.names())
            .finish()
    }
}

impl ClusterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cluster, returning the handle it replaced (if any)
    pub fn add_or_replace(
        &self,
        name: impl Into<String>,
        cluster: Arc<dyn ClusterClient>,
    ) -> Option<Arc<dyn ClusterClient>> {
        self.clusters.write().insert(name.into(), cluster)
    }

    /// Remove a cluster, returning its handle
    pub fn remove(&self, name: &str) -> Option<Arc<dyn ClusterClient>> {
        self.clusters.write().remove(name)
    }

    /// Look up a cluster by name.
    ///
    /// An empty name returns any one cluster (the first by name); only for
    /// callers that do not care which cluster answers.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let clusters = self.clusters.read();
        let found = if name.is_empty() {
            clusters.values().next()
        } else {
            clusters.get(name)
        };
        found
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("cluster {name:?}")))
    }

    /// Call `f` for every cluster.
    ///
    /// Handles are collected first so `f` may call back into the registry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<dyn ClusterClient>),
    {
        let snapshot: Vec<(String, Arc<dyn ClusterClient>)> = self
            .clusters
            .read()
            .iter()
            .map(|(name, cluster)| (name.clone(), Arc::clone(cluster)))
            .collect();
        for (name, cluster) in &snapshot {
            f(name, cluster);
        }
    }

    /// Names of all registered clusters, sorted
    pub fn names(&self) -> Vec<String> {
        self.clusters.read().keys().cloned().collect()
    }

    /// Number of registered clusters
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// True when no cluster is registered
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockCluster;

    fn cluster(name: &str) -> Arc<dyn ClusterClient> {
        Arc::new(MockCluster::new(name))
    }

    #[test]
    fn test_add_get_remove() {
        let registry = ClusterRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.add_or_replace("c1", cluster("c1")).is_none());
        assert!(
            registry.add_or_replace("c1", cluster("c1")).is_some(),
            "Adding a known name should replace the old handle"
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("c1").unwrap().name(), "c1");

        assert!(registry.remove("c1").is_some());
        let Err(err) = registry.get("c1") else {
            panic!("Removed cluster should not be returned");
        };
        assert!(err.is_not_found(), "Removed cluster should be NotFound");
    }

    #[test]
    fn test_get_empty_name_returns_any_cluster() {
        let registry = ClusterRegistry::new();
        assert!(registry.get("").is_err(), "Empty registry has no cluster to return");

        registry.add_or_replace("b", cluster("b"));
        registry.add_or_replace("a", cluster("a"));
        assert_eq!(registry.get("").unwrap().name(), "a");
    }

    #[test]
    fn test_for_each_can_reenter() {
        let registry = ClusterRegistry::new();
        registry.add_or_replace("c1", cluster("c1"));
        registry.add_or_replace("c2", cluster("c2"));

        let mut seen = Vec::new();
        registry.for_each(|name, _| {
            // Re-entrant mutation must not deadlock
            registry.remove(name);
            seen.push(name.to_string());
        });

        assert_eq!(seen, vec!["c1", "c2"]);
        assert!(registry.is_empty());
    }
}
