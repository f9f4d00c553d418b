//! Resource selection for diagram nodes
//!
//! Follows Kubernetes conventions: resources are identified by
//! group/version/kind and selected by name, by controller owner, or by a
//! `LabelSelector` with `matchLabels` and `matchExpressions`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Selects the resources of a single cluster that belong to a node
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeSelector {
    /// Name of the cluster to select resources from (required)
    pub cluster_name: String,

    /// Kind of the resources to select
    pub gvk: ResourceKind,

    /// Exact name of the resource to select
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of the resources to select; all namespaces when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Label selector for the resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,

    /// Select resources controlled by this owner.
    /// Still bound by `gvk` and `namespace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSelector>,
}

/// Group, version and kind of a resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceKind {
    /// API group; empty for the core group
    #[serde(default)]
    pub group: String,

    /// API version, e.g. `v1`
    pub version: String,

    /// Kind, e.g. `Deployment`
    pub kind: String,
}

impl ResourceKind {
    /// Create a new resource kind
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// `apiVersion` as it appears on objects (`v1` or `apps/v1`)
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Controller owner to select resources by
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OwnerSelector {
    /// Kind of the owner
    pub gvk: ResourceKind,

    /// Name of the owner
    #[serde(default)]
    pub name: String,
}

/// Kubernetes-style label selector
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabelSelector {
    /// Labels that must be present with exactly these values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements, all of which must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// A selector with neither labels nor expressions
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }
}

/// A single set-based label requirement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// Relation between the key and the values
    pub operator: SelectorOperator,

    /// Values for `In`/`NotIn`; must be empty for `Exists`/`DoesNotExist`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Operator of a label requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SelectorOperator {
    /// Label value is one of the values
    In,
    /// Label is absent or its value is none of the values
    NotIn,
    /// Label is present
    Exists,
    /// Label is absent
    DoesNotExist,
}
