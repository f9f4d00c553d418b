//! Top-level configuration types
//!
//! `Config` is delivered as a whole on every reload. Map types are ordered so
//! that serializing equal configs always yields identical bytes, which the
//! styler relies on to derive stable node identities.

use crate::selector::NodeSelector;
use crate::status::ResourceStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for diagram-live
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Base values for dynamic styling of the diagram
    #[serde(default)]
    pub style: Style,

    /// Diagram node names mapped to their configuration
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
}

/// Styling options for the diagram
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Style {
    /// Style text per resource status, e.g. `healthy: "stroke:#0F0"`
    #[serde(default)]
    pub status: BTreeMap<ResourceStatus, String>,
}

impl Style {
    /// Style text for a status, falling back to the built-in default
    pub fn for_status(&self, status: ResourceStatus) -> &str {
        self.status
            .get(&status)
            .map_or_else(|| status.default_style(), String::as_str)
    }
}

/// A node in the diagram
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Node {
    /// How to select the resources for this node
    pub selector: NodeSelector,

    /// How to determine the health of the node
    #[serde(default)]
    pub health: Health,

    /// Optional label expression; evaluated with the matched resources bound
    /// as `resources` and must produce a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Health rule of a node
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Health {
    /// Healthy as soon as at least one resource is present
    #[serde(default, alias = "whenPresent")]
    pub want_present_only: bool,

    /// Condition type (in `status.conditions`) that must be `True`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
}
