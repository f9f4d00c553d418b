//! Mock cluster for unit testing
//!
//! Stores `DynamicObject`s in memory and emits watch events to every open
//! watch, so the styler can be exercised without a running API server.
//!
//! Watches are filtered by kind and namespace only. Label and field selectors
//! of a query are ignored, which leaves all matching to the caller.

use crate::cluster_trait::{ClusterClient, EventStream};
use crate::error::ClusterError;
use crate::query::{ResourceQuery, ServedKind};
use futures::{StreamExt, stream};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ResourceExt};
use kube_runtime::watcher::Event;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;

type ObjectKey = (String, String, String, String);

#[derive(Debug, Clone)]
enum Change {
    Apply(DynamicObject),
    Delete(DynamicObject),
}

impl Change {
    fn object(&self) -> &DynamicObject {
        match self {
            Change::Apply(obj) | Change::Delete(obj) => obj,
        }
    }
}

/// In-memory cluster
#[derive(Clone)]
pub struct MockCluster {
    name: String,
    objects: Arc<Mutex<BTreeMap<ObjectKey, DynamicObject>>>,
    changes: broadcast::Sender<Change>,
    watches_opened: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCluster").field("name", &self.name).finish_non_exhaustive()
    }
}

impl MockCluster {
    /// Create an empty mock cluster
    pub fn new(name: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            name: name.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            changes,
            watches_opened: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build an object of the given kind (for test setup)
    pub fn object(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> DynamicObject {
        let mut obj = DynamicObject::new(name, &ApiResource::from_gvk(gvk));
        obj.metadata.namespace = namespace.map(str::to_string);
        obj
    }

    /// Create or replace an object and notify open watches
    pub fn apply(&self, obj: DynamicObject) {
        let mut objects = self.objects.lock();
        objects.insert(object_key(&obj), obj.clone());
        // No receivers just means nobody is watching yet
        let _ = self.changes.send(Change::Apply(obj));
    }

    /// Delete an object and notify open watches
    pub fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        let template = Self::object(gvk, namespace, name);
        let mut objects = self.objects.lock();
        let removed = objects.remove(&object_key(&template))?;
        let _ = self.changes.send(Change::Delete(removed.clone()));
        Some(removed)
    }

    /// Number of watches opened so far
    pub fn watches_opened(&self) -> usize {
        self.watches_opened.load(Ordering::SeqCst)
    }

    /// Make get and list fail with a transient error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ClusterError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ClusterError::Watch(format!("cluster {} unavailable", self.name)))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        self.check_available()?;
        let key = object_key(&Self::object(gvk, namespace, name));
        self.objects
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{}/{}", namespace.unwrap_or_default(), name)))
    }

    async fn list(&self, query: &ResourceQuery) -> Result<Vec<DynamicObject>, ClusterError> {
        self.check_available()?;
        Ok(self
            .objects
            .lock()
            .values()
            .filter(|obj| in_scope(query, obj))
            .cloned()
            .collect())
    }

    fn watch(&self, query: &ResourceQuery) -> EventStream {
        // Snapshot and subscribe under the same lock so no change is lost in between
        let (initial, receiver) = {
            let objects = self.objects.lock();
            let initial: Vec<DynamicObject> = objects
                .values()
                .filter(|obj| in_scope(query, obj))
                .cloned()
                .collect();
            (initial, self.changes.subscribe())
        };
        self.watches_opened.fetch_add(1, Ordering::SeqCst);

        let init = stream::iter(
            std::iter::once(Event::Init)
                .chain(initial.into_iter().map(Event::InitApply))
                .chain(std::iter::once(Event::InitDone))
                .map(Ok),
        );

        let query = query.clone();
        let live = stream::unfold(receiver, move |mut receiver| {
            let query = query.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(change) if in_scope(&query, change.object()) => {
                            let event = match change {
                                Change::Apply(obj) => Event::Apply(obj),
                                Change::Delete(obj) => Event::Delete(obj),
                            };
                            return Some((Ok(event), receiver));
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        init.chain(live).boxed()
    }

    /// Every kind with at least one stored object; plurals are the
    /// lowercased kind with an `s` appended
    async fn served_kinds(&self) -> Result<Vec<ServedKind>, ClusterError> {
        self.check_available()?;
        let mut served: BTreeMap<(String, String), ServedKind> = BTreeMap::new();
        for obj in self.objects.lock().values() {
            let Some(types) = &obj.types else {
                continue;
            };
            let (group, version) = match types.api_version.split_once('/') {
                Some((group, version)) => (group, version),
                None => ("", types.api_version.as_str()),
            };
            served
                .entry((types.api_version.clone(), types.kind.clone()))
                .or_insert_with(|| ServedKind {
                    gvk: GroupVersionKind::gvk(group, version, &types.kind),
                    plural: format!("{}s", types.kind.to_lowercase()),
                    namespaced: obj.metadata.namespace.is_some(),
                    listable: true,
                });
        }
        Ok(served.into_values().collect())
    }
}

fn object_key(obj: &DynamicObject) -> ObjectKey {
    let (api_version, kind) = obj
        .types
        .as_ref()
        .map(|t| (t.api_version.clone(), t.kind.clone()))
        .unwrap_or_default();
    (api_version, kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

fn in_scope(query: &ResourceQuery, obj: &DynamicObject) -> bool {
    let Some(types) = &obj.types else {
        return false;
    };
    if types.api_version != query.api_version() || types.kind != query.gvk.kind {
        return false;
    }
    match &query.namespace {
        Some(ns) => obj.namespace().as_deref() == Some(ns.as_str()),
        None => true,
    }
}
