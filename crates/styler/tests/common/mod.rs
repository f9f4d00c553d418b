//! Shared helpers for styler integration tests

#![allow(dead_code)] // Not every test file uses every helper

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use std::collections::BTreeMap;
use std::time::Duration;

pub fn database_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("example.com", "v1", "Database")
}

/// Database in `default` labelled `app=<app>`
pub fn database(name: &str, app: &str) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ApiResource::from_gvk(&database_gvk()));
    obj.metadata.namespace = Some("default".to_string());
    obj.metadata.labels = Some(BTreeMap::from([("app".to_string(), app.to_string())]));
    obj
}

/// Database with a `Ready` condition
pub fn database_with_ready(name: &str, app: &str, ready: &str) -> DynamicObject {
    let mut obj = database(name, app);
    obj.data = serde_json::json!({
        "status": { "conditions": [{ "type": "Ready", "status": ready }] }
    });
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

/// Give background tasks time to drain their pending events
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
