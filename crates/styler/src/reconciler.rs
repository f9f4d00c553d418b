//! Node watcher and reconciler.
//!
//! One [`NodeWatcher`] per configured node. It is engaged by the
//! [`Multiplexer`](crate::multiplexer::Multiplexer) with the cluster named in
//! the node's selector, opens a watch for the node's resources and keeps the
//! node's [`ResourceTracker`] and [`StyleFragment`] current.
//!
//! Cancellation is two-level: the node token stops everything the node owns,
//! and each cluster engagement runs under a child token so a replaced or
//! removed cluster can be released on its own. Every mutation checks the
//! relevant token under the lock it mutates.

use crate::backoff::FibonacciBackoff;
use crate::error::StylerError;
use crate::label::LabelProgram;
use crate::multiplexer::ClusterAware;
use crate::resources::{ResourceKey, ResourceTracker};
use crate::selector::ResourcePredicate;
use crate::status::ResourceState;
use crate::styling::{StyleFragment, Styling};
use cluster_client::{ClusterClient, ResourceQuery};
use diagram_config::{Node, Style};
use futures::StreamExt;
use kube::api::{DynamicObject, GroupVersionKind};
use kube_runtime::watcher;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches the resources of one node and keeps its fragment current
#[derive(Clone)]
pub struct NodeWatcher {
    inner: Arc<NodeState>,
}

struct NodeState {
    node_name: String,
    id: String,
    node: Node,
    gvk: GroupVersionKind,
    predicate: ResourcePredicate,
    label: Option<Arc<dyn LabelProgram>>,
    style: Arc<RwLock<Style>>,
    styling: Arc<Styling>,
    token: CancellationToken,
    tracker: Mutex<ResourceTracker>,
    engagements: Mutex<HashMap<String, CancellationToken>>,
    // Serializes recomputes so the last one always publishes the latest state
    recompute_lock: Mutex<()>,
}

impl std::fmt::Debug for NodeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeWatcher")
            .field("node", &self.inner.node_name)
            .field("id", &self.inner.id)
            .field("predicate", &self.inner.predicate)
            .field("tracked", &self.inner.tracker.lock().len())
            .finish_non_exhaustive()
    }
}

impl NodeWatcher {
    /// Create a watcher for a node.
    ///
    /// `token` scopes all background work of the watcher; `label` is the
    /// compiled label template, if the node has a usable one.
    pub fn new(
        node_name: impl Into<String>,
        id: impl Into<String>,
        node: Node,
        label: Option<Arc<dyn LabelProgram>>,
        style: Arc<RwLock<Style>>,
        styling: Arc<Styling>,
        token: CancellationToken,
    ) -> Self {
        let kind = &node.selector.gvk;
        let gvk = GroupVersionKind::gvk(&kind.group, &kind.version, &kind.kind);
        let predicate = ResourcePredicate::from_selector(&node.selector);
        Self {
            inner: Arc::new(NodeState {
                node_name: node_name.into(),
                id: id.into(),
                node,
                gvk,
                predicate,
                label,
                style,
                styling,
                token,
                tracker: Mutex::new(ResourceTracker::new()),
                engagements: Mutex::new(HashMap::new()),
                recompute_lock: Mutex::new(()),
            }),
        }
    }

    /// Name of the node
    pub fn node_name(&self) -> &str {
        &self.inner.node_name
    }

    /// Identity of the node definition this watcher was built from
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Active selection strategy
    pub fn predicate(&self) -> &ResourcePredicate {
        &self.inner.predicate
    }

    /// Keys of the currently tracked resources
    pub fn tracked(&self) -> Vec<ResourceKey> {
        self.inner.tracker.lock().keys()
    }

    /// Names of the clusters this watcher is currently engaged with
    pub fn engaged_clusters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.engagements.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Current state of the node
    pub fn state(&self) -> ResourceState {
        ResourceState::new(&self.inner.node.health, self.inner.tracker.lock().snapshot())
    }

    /// Recompute and publish the node's fragment
    pub fn refresh(&self) {
        self.inner.recompute();
    }

    /// Stop all background work. Idempotent.
    pub fn stop(&self) {
        self.inner.token.cancel();
        self.inner.engagements.lock().clear();
    }

    /// True once stopped
    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl ClusterAware for NodeWatcher {
    fn engage(&self, name: &str, cluster: Arc<dyn ClusterClient>) -> Result<(), StylerError> {
        let state = &self.inner;
        if name != state.node.selector.cluster_name {
            return Ok(());
        }
        if state.token.is_cancelled() {
            debug!(node = %state.node_name, cluster = %name, "Ignoring engagement of stopped watcher");
            return Ok(());
        }
        let Some(query) = state.predicate.query(state.gvk.clone()) else {
            debug!(node = %state.node_name, cluster = %name, "Selector matches nothing, not watching");
            return Ok(());
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| StylerError::Engage {
            cluster: name.to_string(),
            watcher: state.node_name.clone(),
            message: e.to_string(),
        })?;

        let token = state.token.child_token();
        if let Some(previous) = state
            .engagements
            .lock()
            .insert(name.to_string(), token.clone())
        {
            debug!(node = %state.node_name, cluster = %name, "Replacing engagement");
            previous.cancel();
        }

        info!(
            node = %state.node_name,
            cluster = %name,
            gvk = %state.node.selector.gvk,
            "Engaging node watcher"
        );
        runtime.spawn(Arc::clone(state).run_engagement(name.to_string(), cluster, query, token));
        Ok(())
    }

    fn disengage(&self, name: &str) {
        let state = &self.inner;
        let Some(token) = state.engagements.lock().remove(name) else {
            return;
        };
        token.cancel();
        info!(node = %state.node_name, cluster = %name, "Disengaged node watcher");

        // The node only selects from one cluster, everything tracked came from it
        state.tracker.lock().clear();
        state.recompute();
    }
}

impl NodeState {
    async fn run_engagement(
        self: Arc<Self>,
        cluster_name: String,
        cluster: Arc<dyn ClusterClient>,
        query: ResourceQuery,
        token: CancellationToken,
    ) {
        let mut backoff = FibonacciBackoff::default();

        loop {
            let mut stream = cluster.watch(&query);
            // Keys seen since the last Init; Some while a (re)list is in progress
            let mut relist: Option<BTreeSet<ResourceKey>> = None;

            loop {
                let next = tokio::select! {
                    () = token.cancelled() => {
                        debug!(node = %self.node_name, cluster = %cluster_name, "Engagement cancelled");
                        return;
                    }
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(event)) => {
                        if matches!(event, watcher::Event::InitDone) {
                            backoff.reset();
                        }
                        if self.apply_event(&cluster_name, event, &mut relist, &token) {
                            self.recompute();
                        }
                    }
                    Some(Err(e)) => {
                        warn!(
                            node = %self.node_name,
                            cluster = %cluster_name,
                            "Watch error, re-checking tracked resources: {}",
                            e
                        );
                        let changed = tokio::select! {
                            () = token.cancelled() => return,
                            changed = self.recheck(cluster.as_ref(), &token) => changed,
                        };
                        if changed {
                            self.recompute();
                        }
                    }
                    None => break,
                }
            }

            let delay = backoff.next_delay();
            warn!(
                node = %self.node_name,
                cluster = %cluster_name,
                "Watch stream ended, reopening in {:?}",
                delay
            );
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Apply one watch event to the tracker; true if a recompute is due
    fn apply_event(
        &self,
        cluster_name: &str,
        event: watcher::Event<DynamicObject>,
        relist: &mut Option<BTreeSet<ResourceKey>>,
        token: &CancellationToken,
    ) -> bool {
        let mut tracker = self.tracker.lock();
        if token.is_cancelled() {
            return false;
        }

        match event {
            watcher::Event::Init => {
                debug!(node = %self.node_name, cluster = %cluster_name, "Listing resources");
                *relist = Some(BTreeSet::new());
                false
            }
            watcher::Event::InitApply(obj) => {
                if self.predicate.matches(&obj) {
                    if let Some(seen) = relist.as_mut() {
                        seen.insert(ResourceKey::of(&obj));
                    }
                    tracker.replace(obj);
                }
                false
            }
            watcher::Event::InitDone => {
                let seen = relist.take().unwrap_or_default();
                let pruned = tracker.retain(&seen);
                debug!(
                    node = %self.node_name,
                    cluster = %cluster_name,
                    tracked = tracker.len(),
                    pruned,
                    "Listing complete"
                );
                true
            }
            watcher::Event::Apply(obj) => {
                let key = ResourceKey::of(&obj);
                if self.predicate.matches(&obj) {
                    debug!(node = %self.node_name, resource = %key, "Resource applied");
                    tracker.replace(obj);
                    true
                } else if tracker.delete(&key) {
                    debug!(node = %self.node_name, resource = %key, "Resource no longer matches");
                    true
                } else {
                    false
                }
            }
            watcher::Event::Delete(obj) => {
                let key = ResourceKey::of(&obj);
                let removed = tracker.delete(&key);
                if removed {
                    debug!(node = %self.node_name, resource = %key, "Resource deleted");
                }
                removed
            }
        }
    }

    /// Fetch every tracked resource again; drop the ones that are gone.
    ///
    /// Transient errors keep the previous state.
    async fn recheck(&self, cluster: &dyn ClusterClient, token: &CancellationToken) -> bool {
        let keys = self.tracker.lock().keys();
        let mut changed = false;

        for key in keys {
            let result = cluster.get(&self.gvk, key.namespace(), &key.name).await;

            let mut tracker = self.tracker.lock();
            if token.is_cancelled() {
                return changed;
            }
            match result {
                Ok(obj) if self.predicate.matches(&obj) => {
                    tracker.replace(obj);
                    changed = true;
                }
                Ok(_) => {
                    changed |= tracker.delete(&key);
                }
                Err(e) if e.is_not_found() => {
                    info!(node = %self.node_name, resource = %key, "Resource not found, no longer tracking");
                    changed |= tracker.delete(&key);
                }
                Err(e) => {
                    debug!(node = %self.node_name, resource = %key, "Keeping resource, lookup failed: {}", e);
                }
            }
        }
        changed
    }

    fn recompute(&self) {
        let _guard = self.recompute_lock.lock();
        if self.token.is_cancelled() {
            return;
        }

        let state = ResourceState::new(&self.node.health, self.tracker.lock().snapshot());
        let style = self.style.read().for_status(state.status).to_string();
        let mut fragment = StyleFragment::new(&self.node_name, &style);

        if let Some(program) = &self.label {
            match program.evaluate(&state.resources) {
                Ok(label) => fragment = fragment.with_label(&self.node_name, &label),
                Err(e) => warn!(node = %self.node_name, "Failed to expand label, omitting it: {}", e),
            }
        }

        if self
            .styling
            .set_fragment_unless_cancelled(&self.node_name, fragment, &self.token)
        {
            debug!(
                node = %self.node_name,
                status = %state.status,
                count = state.count,
                "Updated styling"
            );
        }
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
