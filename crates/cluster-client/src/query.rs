//! Resource queries shared by list and watch

use kube::api::{GroupVersionKind, ListParams};
use kube_runtime::watcher;

/// A kind served by a cluster, as reported by API discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedKind {
    /// Group, version and kind
    pub gvk: GroupVersionKind,
    /// Plural resource name, e.g. `deployments`
    pub plural: String,
    /// Whether objects of this kind live in namespaces
    pub namespaced: bool,
    /// Whether the kind supports the `list` verb
    pub listable: bool,
}

/// Kind, namespace and server-side filters of a list or watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Kind of the resources
    pub gvk: GroupVersionKind,
    /// Namespace to restrict to; all namespaces when `None`
    pub namespace: Option<String>,
    /// Label selector string, e.g. `app=payments,tier in (a,b)`
    pub label_selector: Option<String>,
    /// Field selector string, e.g. `metadata.name=api`
    pub field_selector: Option<String>,
}

impl ResourceQuery {
    /// Query all resources of a kind in all namespaces
    pub fn new(gvk: GroupVersionKind) -> Self {
        Self {
            gvk,
            namespace: None,
            label_selector: None,
            field_selector: None,
        }
    }

    /// Restrict the query to a namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a label selector
    #[must_use]
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Add a field selector
    #[must_use]
    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// `apiVersion` of the queried kind
    pub fn api_version(&self) -> String {
        if self.gvk.group.is_empty() {
            self.gvk.version.clone()
        } else {
            format!("{}/{}", self.gvk.group, self.gvk.version)
        }
    }

    pub(crate) fn list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }

    pub(crate) fn watcher_config(&self) -> watcher::Config {
        let mut config = watcher::Config::default();
        if let Some(labels) = &self.label_selector {
            config = config.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            config = config.fields(fields);
        }
        config
    }
}
