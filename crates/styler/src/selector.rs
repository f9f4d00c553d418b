//! Selector predicates.
//!
//! A [`NodeSelector`] is turned into a [`ResourcePredicate`] once, when the
//! node watcher is built. Exactly one strategy is active, by precedence:
//! name, owner, labels, then nothing.

use cluster_client::ResourceQuery;
use diagram_config::{LabelSelector, LabelSelectorRequirement, NodeSelector, SelectorOperator};
use kube::api::{DynamicObject, GroupVersionKind, ResourceExt};
use std::collections::BTreeMap;

/// Which resources of the selected kind belong to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePredicate {
    /// Exact name, optionally restricted to a namespace
    Name {
        /// Resource name
        name: String,
        /// Namespace, any when `None`
        namespace: Option<String>,
    },
    /// Resources whose controller owner reference matches
    Owner {
        /// `apiVersion` of the owner
        api_version: String,
        /// Kind of the owner
        kind: String,
        /// Name of the owner
        name: String,
        /// Namespace, any when `None`
        namespace: Option<String>,
    },
    /// Resources matching a label selector
    Labels {
        /// Selector to match
        selector: LabelSelector,
        /// Namespace, any when `None`
        namespace: Option<String>,
    },
    /// Selects nothing
    Nothing,
}

impl ResourcePredicate {
    /// Build the predicate for a selector.
    ///
    /// An owner with an empty name and an empty label selector do not count
    /// as a strategy.
    pub fn from_selector(selector: &NodeSelector) -> Self {
        let namespace = selector.namespace.clone().filter(|ns| !ns.is_empty());

        if let Some(name) = selector.name.as_ref().filter(|n| !n.is_empty()) {
            return ResourcePredicate::Name {
                name: name.clone(),
                namespace,
            };
        }
        if let Some(owner) = selector.owner.as_ref().filter(|o| !o.name.is_empty()) {
            return ResourcePredicate::Owner {
                api_version: owner.gvk.api_version(),
                kind: owner.gvk.kind.clone(),
                name: owner.name.clone(),
                namespace,
            };
        }
        if let Some(labels) = selector.label_selector.as_ref().filter(|l| !l.is_empty()) {
            return ResourcePredicate::Labels {
                selector: labels.clone(),
                namespace,
            };
        }
        ResourcePredicate::Nothing
    }

    /// Whether a resource belongs to the node
    pub fn matches(&self, obj: &DynamicObject) -> bool {
        match self {
            ResourcePredicate::Name { name, namespace } => {
                in_namespace(namespace.as_deref(), obj) && obj.name_any() == *name
            }
            ResourcePredicate::Owner {
                api_version,
                kind,
                name,
                namespace,
            } => {
                in_namespace(namespace.as_deref(), obj)
                    && obj.owner_references().iter().any(|owner| {
                        owner.controller == Some(true)
                            && owner.api_version == *api_version
                            && owner.kind == *kind
                            && owner.name == *name
                    })
            }
            ResourcePredicate::Labels {
                selector,
                namespace,
            } => in_namespace(namespace.as_deref(), obj) && label_matches(selector, obj.labels()),
            ResourcePredicate::Nothing => false,
        }
    }

    /// The watch to open for this predicate; `None` for [`ResourcePredicate::Nothing`].
    ///
    /// Name and label strategies are filtered server side. Owner references
    /// cannot be, so owner watches list the whole kind and rely on
    /// [`ResourcePredicate::matches`].
    pub fn query(&self, gvk: GroupVersionKind) -> Option<ResourceQuery> {
        let (query, namespace) = match self {
            ResourcePredicate::Name { name, namespace } => (
                ResourceQuery::new(gvk).fields(format!("metadata.name={name}")),
                namespace,
            ),
            ResourcePredicate::Owner { namespace, .. } => (ResourceQuery::new(gvk), namespace),
            ResourcePredicate::Labels {
                selector,
                namespace,
            } => (
                ResourceQuery::new(gvk).labels(format_label_selector(selector)),
                namespace,
            ),
            ResourcePredicate::Nothing => return None,
        };
        Some(match namespace {
            Some(ns) => query.namespace(ns.clone()),
            None => query,
        })
    }
}

fn in_namespace(namespace: Option<&str>, obj: &DynamicObject) -> bool {
    match namespace {
        Some(ns) => obj.metadata.namespace.as_deref() == Some(ns),
        None => true,
    }
}

/// Evaluate a label selector against a label set
pub fn label_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    selector
        .match_labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
        && selector
            .match_expressions
            .iter()
            .all(|req| requirement_matches(req, labels))
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let value = labels.get(&req.key);
    match req.operator {
        SelectorOperator::In => value.is_some_and(|v| req.values.contains(v)),
        SelectorOperator::NotIn => value.is_none_or(|v| !req.values.contains(v)),
        SelectorOperator::Exists => value.is_some(),
        SelectorOperator::DoesNotExist => value.is_none(),
    }
}

/// Render a label selector in the API server's string syntax,
/// e.g. `app=payments,tier in (a,b),!legacy`
pub fn format_label_selector(selector: &LabelSelector) -> String {
    let labels = selector
        .match_labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"));
    let expressions = selector.match_expressions.iter().map(|req| match req.operator {
        SelectorOperator::In => format!("{} in ({})", req.key, req.values.join(",")),
        SelectorOperator::NotIn => format!("{} notin ({})", req.key, req.values.join(",")),
        SelectorOperator::Exists => req.key.clone(),
        SelectorOperator::DoesNotExist => format!("!{}", req.key),
    });
    labels.chain(expressions).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod tests;
