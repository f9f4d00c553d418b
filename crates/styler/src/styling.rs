//! Aggregated styling output.
//!
//! Every node owns one [`StyleFragment`]. Fragments are replaced whole under a
//! lock, so [`Styling::render`] never sees half of an update. Subscribers are
//! woken through a `tokio::sync::watch` channel carrying a revision counter;
//! a slow subscriber only ever misses intermediate revisions.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Rendered style and optional label of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleFragment {
    style: String,
    label: Option<String>,
}

impl StyleFragment {
    /// Fragment with a style directive only
    pub fn new(node: &str, style: &str) -> Self {
        Self {
            style: format!("style {node} {style}\n"),
            label: None,
        }
    }

    /// Add a label directive
    #[must_use]
    pub fn with_label(mut self, node: &str, label: &str) -> Self {
        self.label = Some(format!("{node}[{label}]\n"));
        self
    }

    /// The `style <node> <style>` line
    pub fn style_line(&self) -> &str {
        &self.style
    }

    /// The `<node>[<label>]` line, if any
    pub fn label_line(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.style);
        if let Some(label) = &self.label {
            out.push_str(label);
        }
    }
}

/// Per-node fragments and change notification
#[derive(Debug)]
pub struct Styling {
    fragments: RwLock<BTreeMap<String, StyleFragment>>,
    revision: watch::Sender<u64>,
}

impl Default for Styling {
    fn default() -> Self {
        Self::new()
    }
}

impl Styling {
    /// Empty styling at revision 0
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            fragments: RwLock::new(BTreeMap::new()),
            revision,
        }
    }

    /// Set a node's fragment; returns true if the output changed
    pub fn set_fragment(&self, node: &str, fragment: StyleFragment) -> bool {
        let mut fragments = self.fragments.write();
        self.store(&mut fragments, node, fragment)
    }

    /// Set a node's fragment unless `token` is cancelled.
    ///
    /// The token is checked while holding the lock, so once the owner of the
    /// token has cancelled it and removed the fragment, nothing can put it
    /// back.
    pub fn set_fragment_unless_cancelled(
        &self,
        node: &str,
        fragment: StyleFragment,
        token: &CancellationToken,
    ) -> bool {
        let mut fragments = self.fragments.write();
        if token.is_cancelled() {
            debug!(node = %node, "Discarding fragment of stopped watcher");
            return false;
        }
        self.store(&mut fragments, node, fragment)
    }

    /// Drop a node's fragment; returns true if there was one
    pub fn remove_fragment(&self, node: &str) -> bool {
        let removed = self.fragments.write().remove(node).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    /// Current fragment of a node
    pub fn fragment(&self, node: &str) -> Option<StyleFragment> {
        self.fragments.read().get(node).cloned()
    }

    /// All fragments concatenated, ordered by node name
    pub fn render(&self) -> String {
        let fragments = self.fragments.read();
        let mut out = String::new();
        for fragment in fragments.values() {
            fragment.write_to(&mut out);
        }
        out
    }

    /// Receiver that is marked changed after every fragment change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Number of changes so far
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn store(
        &self,
        fragments: &mut BTreeMap<String, StyleFragment>,
        node: &str,
        fragment: StyleFragment,
    ) -> bool {
        if fragments.get(node) == Some(&fragment) {
            return false;
        }
        fragments.insert(node.to_string(), fragment);
        self.bump();
        true
    }

    fn bump(&self) {
        // send_modify works without receivers and never blocks
        self.revision.send_modify(|revision| *revision += 1);
    }
}
