//! Watch lifecycle management.
//!
//! [`WatchManager::update`] receives the full node map on every config load
//! and diffs it against the running watchers by node identity: the hash of
//! the node name and its serialized definition. Unchanged nodes keep their
//! watcher; any change to a node stops the old watcher and starts a new one.

use crate::error::StylerError;
use crate::label::{LabelEvaluator, LabelProgram};
use crate::multiplexer::Multiplexer;
use crate::reconciler::NodeWatcher;
use crate::resources::ResourceKey;
use crate::styling::Styling;
use diagram_config::{Node, Style};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of a node definition
pub fn hash_node(name: &str, node: &Node) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    // Maps in Node are ordered, so equal nodes serialize identically
    if let Ok(bytes) = serde_json::to_vec(node) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

/// Watcher start/stop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Watchers started since creation
    pub started: usize,
    /// Watchers stopped since creation
    pub stopped: usize,
    /// Watchers currently running
    pub running: usize,
}

/// Starts and stops node watchers as the configuration changes
pub struct WatchManager {
    multiplexer: Arc<Multiplexer>,
    evaluator: Arc<dyn LabelEvaluator>,
    styling: Arc<Styling>,
    style: Arc<RwLock<Style>>,
    token: CancellationToken,
    // Node hash to watcher; held for the whole of `update`
    watchers: Mutex<BTreeMap<String, NodeWatcher>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl WatchManager {
    /// Create a manager.
    ///
    /// Every watcher runs under a child of `token`; cancelling it stops them all.
    pub fn new(
        multiplexer: Arc<Multiplexer>,
        evaluator: Arc<dyn LabelEvaluator>,
        styling: Arc<Styling>,
        token: CancellationToken,
    ) -> Self {
        Self {
            multiplexer,
            evaluator,
            styling,
            style: Arc::new(RwLock::new(Style::default())),
            token,
            watchers: Mutex::new(BTreeMap::new()),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    /// Reconcile running watchers against `nodes`.
    ///
    /// Failures of individual nodes are joined into one error; all other
    /// nodes are still processed. A node that failed to start is not
    /// remembered, so the next call retries it.
    pub fn update(&self, nodes: &BTreeMap<String, Node>) -> Result<(), StylerError> {
        let mut watchers = self.watchers.lock();
        let hashed: BTreeMap<String, (&String, &Node)> = nodes
            .iter()
            .map(|(name, node)| (hash_node(name, node), (name, node)))
            .collect();

        // Stop watchers of removed or changed nodes first, so a changed node's
        // new fragment is not removed afterwards
        let stale: Vec<String> = watchers
            .keys()
            .filter(|hash| !hashed.contains_key(*hash))
            .cloned()
            .collect();
        for hash in stale {
            if let Some(watcher) = watchers.remove(&hash) {
                self.stop_watcher(&hash, &watcher);
            }
        }

        let mut errors = Vec::new();
        for (hash, (name, node)) in hashed {
            if watchers.contains_key(&hash) {
                continue;
            }
            match self.start_watcher(&hash, name, node, &mut errors) {
                Ok(watcher) => {
                    watchers.insert(hash, watcher);
                }
                Err(e) => {
                    warn!(node = %name, "Failed to start watch for node: {}", e);
                    errors.push(e);
                }
            }
        }

        StylerError::join(errors)
    }

    /// Replace the status styles; recomputes every node if they changed
    pub fn set_style(&self, style: &Style) {
        {
            let mut current = self.style.write();
            if *current == *style {
                return;
            }
            *current = style.clone();
        }
        info!("Status styles changed, refreshing all nodes");
        for watcher in self.watchers.lock().values() {
            watcher.refresh();
        }
    }

    /// Watcher currently serving a node
    pub fn watcher(&self, node_name: &str) -> Option<NodeWatcher> {
        self.watchers
            .lock()
            .values()
            .find(|w| w.node_name() == node_name)
            .cloned()
    }

    /// Resources currently tracked for a node
    pub fn tracked(&self, node_name: &str) -> Option<Vec<ResourceKey>> {
        self.watcher(node_name).map(|w| w.tracked())
    }

    /// Start/stop counters
    pub fn stats(&self) -> WatchStats {
        WatchStats {
            started: self.started.load(Ordering::SeqCst),
            stopped: self.stopped.load(Ordering::SeqCst),
            running: self.watchers.lock().len(),
        }
    }

    /// Stop every watcher. Fragments stay as last published.
    pub fn shutdown(&self) {
        self.token.cancel();
        let mut watchers = self.watchers.lock();
        for (hash, watcher) in watchers.iter() {
            self.multiplexer.deregister_watcher(hash);
            watcher.stop();
        }
        watchers.clear();
    }

    fn start_watcher(
        &self,
        hash: &str,
        name: &str,
        node: &Node,
        errors: &mut Vec<StylerError>,
    ) -> Result<NodeWatcher, StylerError> {
        node.validate(name).map_err(|e| StylerError::InvalidSelector {
            node: name.to_string(),
            message: e.to_string(),
        })?;

        let label = self.compile_label(name, node, errors);
        let watcher = NodeWatcher::new(
            name,
            hash,
            node.clone(),
            label,
            Arc::clone(&self.style),
            Arc::clone(&self.styling),
            self.token.child_token(),
        );
        debug!(node = %name, hash = %hash, predicate = ?watcher.predicate(), "Starting watch for node");

        // Publish the absent state before any cluster shows up
        watcher.refresh();

        if let Err(e) = self
            .multiplexer
            .register_watcher(hash, Arc::new(watcher.clone()))
        {
            watcher.stop();
            self.styling.remove_fragment(name);
            return Err(e);
        }

        self.started.fetch_add(1, Ordering::SeqCst);
        info!(node = %name, "Started watch for node");
        Ok(watcher)
    }

    /// Compile the label; a broken label is reported but the node still runs
    fn compile_label(
        &self,
        name: &str,
        node: &Node,
        errors: &mut Vec<StylerError>,
    ) -> Option<Arc<dyn LabelProgram>> {
        let template = node.label.as_deref().filter(|l| !l.trim().is_empty())?;
        match self.evaluator.compile(template) {
            Ok(program) => Some(program),
            Err(e) => {
                warn!(node = %name, "Label will be omitted: {}", e);
                errors.push(StylerError::Label {
                    node: name.to_string(),
                    source: e,
                });
                None
            }
        }
    }

    fn stop_watcher(&self, hash: &str, watcher: &NodeWatcher) {
        info!(node = %watcher.node_name(), hash = %hash, "Stopping watch for node");
        watcher.stop();
        self.multiplexer.deregister_watcher(hash);
        self.styling.remove_fragment(watcher.node_name());
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "watches_test.rs"]
mod tests;
