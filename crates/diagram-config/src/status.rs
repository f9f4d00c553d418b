//! Resource status of a diagram node

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the resources matched by a node.
///
/// Serializes lowercase (`absent`, `pending`, `healthy`), which is also the
/// key format of the `style.status` map.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// No resource matches the node's selector
    Absent,
    /// Resources exist but the health rule is not satisfied
    Pending,
    /// Resources exist and the health rule is satisfied
    Healthy,
}

impl ResourceStatus {
    /// Lowercase name of the status
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Absent => "absent",
            ResourceStatus::Pending => "pending",
            ResourceStatus::Healthy => "healthy",
        }
    }

    /// Built-in style used when the config has no entry for this status
    pub fn default_style(self) -> &'static str {
        match self {
            ResourceStatus::Absent => "stroke:#808080",
            ResourceStatus::Pending => "stroke:#FFFF00",
            ResourceStatus::Healthy => "stroke:#00FF00",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
