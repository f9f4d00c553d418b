//! Status computation.

use diagram_config::{Health, ResourceStatus};
use kube::api::DynamicObject;

/// Derived state of a node
#[derive(Debug, Clone)]
pub struct ResourceState {
    /// Computed status
    pub status: ResourceStatus,
    /// Number of matched resources
    pub count: usize,
    /// Matched resources, ordered by namespace and name
    pub resources: Vec<DynamicObject>,
}

impl ResourceState {
    /// Compute the state for a set of resources
    pub fn new(health: &Health, resources: Vec<DynamicObject>) -> Self {
        Self {
            status: compute_status(health, &resources),
            count: resources.len(),
            resources,
        }
    }
}

/// Status of a node given its health rule and matched resources.
///
/// * no resources: absent
/// * `wantPresentOnly`: healthy
/// * otherwise healthy iff no resource carries the condition with a status
///   other than `True`; a missing condition counts as healthy
pub fn compute_status(health: &Health, resources: &[DynamicObject]) -> ResourceStatus {
    if resources.is_empty() {
        return ResourceStatus::Absent;
    }
    if health.want_present_only {
        return ResourceStatus::Healthy;
    }
    let condition_type = health.condition_type.as_deref().unwrap_or_default();
    if resources.iter().all(|obj| condition_ok(obj, condition_type)) {
        ResourceStatus::Healthy
    } else {
        ResourceStatus::Pending
    }
}

fn condition_ok(obj: &DynamicObject, condition_type: &str) -> bool {
    let Some(conditions) = obj
        .data
        .pointer("/status/conditions")
        .and_then(serde_json::Value::as_array)
    else {
        return true;
    };

    // First condition of the type decides
    conditions
        .iter()
        .find(|cond| cond.get("type").and_then(serde_json::Value::as_str) == Some(condition_type))
        .is_none_or(|cond| cond.get("status").and_then(serde_json::Value::as_str) == Some("True"))
}
