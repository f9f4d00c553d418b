//! ClusterClient trait for mocking
//!
//! This trait abstracts access to a single cluster. The concrete
//! `KubeCluster` implements it, and tests use `MockCluster`.

use crate::error::ClusterError;
use crate::query::{ResourceQuery, ServedKind};
use futures::stream::BoxStream;
use kube::api::{DynamicObject, GroupVersionKind};
use kube_runtime::watcher;

/// Stream of watch events for one query.
///
/// Follows `kube_runtime::watcher` semantics: a (re)list is delivered as
/// `Init`, zero or more `InitApply`, then `InitDone`; afterwards individual
/// `Apply` and `Delete` events arrive in the order they happened on the
/// cluster.
pub type EventStream = BoxStream<'static, Result<watcher::Event<DynamicObject>, ClusterError>>;

/// Operations the styler needs from a cluster.
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Name the cluster is registered under
    fn name(&self) -> &str;

    /// Get a single resource; `ClusterError::NotFound` if it does not exist
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError>;

    /// List resources matching the query
    async fn list(&self, query: &ResourceQuery) -> Result<Vec<DynamicObject>, ClusterError>;

    /// Watch resources matching the query
    fn watch(&self, query: &ResourceQuery) -> EventStream;

    /// Kinds served by the cluster, one preferred version per kind
    async fn served_kinds(&self) -> Result<Vec<ServedKind>, ClusterError>;
}
