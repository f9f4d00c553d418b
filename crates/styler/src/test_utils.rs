//! Test utilities for unit testing the styler
//!
//! Builders for nodes and resources, and a polling helper for state that is
//! updated by background tasks.

use diagram_config::{Health, LabelSelector, Node, NodeSelector, ResourceKind};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::BTreeMap;
use std::time::Duration;

/// Kind used by most tests
pub fn database_kind() -> ResourceKind {
    ResourceKind::new("example.com", "v1", "Database")
}

/// `GroupVersionKind` of [`database_kind`]
pub fn database_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("example.com", "v1", "Database")
}

/// Node selecting databases labelled `app=<app>` in cluster `cluster`
pub fn label_node(cluster: &str, app: &str) -> Node {
    Node {
        selector: NodeSelector {
            cluster_name: cluster.to_string(),
            gvk: database_kind(),
            name: None,
            namespace: None,
            label_selector: Some(LabelSelector {
                match_labels: BTreeMap::from([("app".to_string(), app.to_string())]),
                match_expressions: Vec::new(),
            }),
            owner: None,
        },
        health: Health {
            want_present_only: true,
            condition_type: None,
        },
        label: None,
    }
}

/// Database object labelled `app=<app>`
pub fn database(namespace: &str, name: &str, app: &str) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ApiResource::from_gvk(&database_gvk()));
    obj.metadata.namespace = Some(namespace.to_string());
    obj.metadata.labels = Some(BTreeMap::from([("app".to_string(), app.to_string())]));
    obj
}

/// Poll `check` until it holds, panicking after five seconds
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {what}");
}
