//! Field validation of a parsed configuration
//!
//! Every problem is collected and reported at once, prefixed with the field
//! path it was found at.

use crate::error::ConfigError;
use crate::model::{Config, Node};
use crate::selector::{LabelSelector, ResourceKind, SelectorOperator};

impl Config {
    /// Validates every node and reports all field errors together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        for (name, node) in &self.nodes {
            if name.trim().is_empty() {
                errors.push("nodes: node name must not be empty".to_string());
            }
            validate_node(&format!("nodes.{name}"), node, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

impl Node {
    /// Validates a single node, reporting errors relative to `nodes.<name>`
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        validate_node(&format!("nodes.{name}"), self, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

fn validate_node(path: &str, node: &Node, errors: &mut Vec<String>) {
    let selector = &node.selector;
    if selector.cluster_name.is_empty() {
        errors.push(format!("{path}.selector.clusterName: Required value"));
    }
    validate_kind(&format!("{path}.selector.gvk"), &selector.gvk, errors);

    if let Some(labels) = &selector.label_selector {
        validate_label_selector(&format!("{path}.selector.labelSelector"), labels, errors);
    }

    if let Some(owner) = &selector.owner {
        let owner_path = format!("{path}.selector.owner");
        if owner.name.is_empty() {
            errors.push(format!("{owner_path}.name: Required value"));
        }
        validate_kind(&format!("{owner_path}.gvk"), &owner.gvk, errors);
    }

    if let Some(label) = &node.label {
        if label.trim().is_empty() {
            errors.push(format!("{path}.label: must not be blank when set"));
        }
    }
}

fn validate_kind(path: &str, kind: &ResourceKind, errors: &mut Vec<String>) {
    if kind.version.is_empty() {
        errors.push(format!("{path}.version: Required value"));
    }
    if kind.kind.is_empty() {
        errors.push(format!("{path}.kind: Required value"));
    }
}

fn validate_label_selector(path: &str, selector: &LabelSelector, errors: &mut Vec<String>) {
    for key in selector.match_labels.keys() {
        if key.is_empty() {
            errors.push(format!("{path}.matchLabels: label key must not be empty"));
        }
    }

    for (i, requirement) in selector.match_expressions.iter().enumerate() {
        let req_path = format!("{path}.matchExpressions[{i}]");
        if requirement.key.is_empty() {
            errors.push(format!("{req_path}.key: Required value"));
        }
        match requirement.operator {
            SelectorOperator::In | SelectorOperator::NotIn => {
                if requirement.values.is_empty() {
                    errors.push(format!(
                        "{req_path}.values: must be specified when `operator` is 'In' or 'NotIn'"
                    ));
                }
            }
            SelectorOperator::Exists | SelectorOperator::DoesNotExist => {
                if !requirement.values.is_empty() {
                    errors.push(format!(
                        "{req_path}.values: may not be specified when `operator` is 'Exists' or 'DoesNotExist'"
                    ));
                }
            }
        }
    }
}
