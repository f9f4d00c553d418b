//! Per-node resource tracking.

use kube::api::{DynamicObject, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};

/// Identity of a tracked resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    /// Namespace; empty for cluster scoped resources
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ResourceKey {
    /// Key of an object
    pub fn of(obj: &DynamicObject) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }

    /// Namespace as an option, `None` when cluster scoped
    pub fn namespace(&self) -> Option<&str> {
        (!self.namespace.is_empty()).then_some(self.namespace.as_str())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Last known resources matched by one node.
///
/// Ordered by key, so snapshots (and labels computed from them) do not depend
/// on event arrival order.
#[derive(Debug, Default, Clone)]
pub struct ResourceTracker {
    resources: BTreeMap<ResourceKey, DynamicObject>,
}

impl ResourceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a resource; returns true if it was new
    pub fn replace(&mut self, obj: DynamicObject) -> bool {
        self.resources.insert(ResourceKey::of(&obj), obj).is_none()
    }

    /// Remove a resource; returns true if it was tracked
    pub fn delete(&mut self, key: &ResourceKey) -> bool {
        self.resources.remove(key).is_some()
    }

    /// Drop every resource not in `seen`; returns the number dropped
    pub fn retain(&mut self, seen: &BTreeSet<ResourceKey>) -> usize {
        let before = self.resources.len();
        self.resources.retain(|key, _| seen.contains(key));
        before - self.resources.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.resources.clear();
    }

    /// Keys of all tracked resources
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.keys().cloned().collect()
    }

    /// Copy of all tracked resources, ordered by key
    pub fn snapshot(&self) -> Vec<DynamicObject> {
        self.resources.values().cloned().collect()
    }

    /// Number of tracked resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
