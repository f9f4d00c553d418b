//! Kubernetes-backed cluster client
//!
//! Resolves kinds through API discovery once per kind and keeps the result,
//! then serves get/list/watch through `Api<DynamicObject>`.

use crate::cluster_trait::{ClusterClient, EventStream};
use crate::error::ClusterError;
use crate::query::{ResourceQuery, ServedKind};
use futures::{StreamExt, TryStreamExt, stream};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{self, ApiCapabilities, Discovery, Scope, verbs};
use kube::Client;
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A named cluster reached through a `kube::Client`
#[derive(Clone)]
pub struct KubeCluster {
    name: String,
    client: Client,
    /// Discovered kinds keyed by `apiVersion/kind`
    kinds: Arc<RwLock<HashMap<String, (ApiResource, ApiCapabilities)>>>,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").field("name", &self.name).finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Creates a cluster handle from an existing client
    pub fn new(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
            kinds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities), ClusterError> {
        let key = kind_key(gvk);
        if let Some(found) = self.kinds.read().await.get(&key) {
            return Ok(found.clone());
        }

        debug!(cluster = %self.name, kind = %key, "Discovering kind");
        let resolved = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| ClusterError::Discovery {
                kind: key.clone(),
                message: e.to_string(),
            })?;

        self.kinds.write().await.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, ClusterError> {
        let (resource, capabilities) = self.resolve(gvk).await?;
        let api = match (&capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeCluster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let api = self.api(gvk, namespace).await?;
        api.get_opt(name).await?.ok_or_else(|| {
            ClusterError::NotFound(format!(
                "{} {}/{}",
                kind_key(gvk),
                namespace.unwrap_or_default(),
                name
            ))
        })
    }

    async fn list(&self, query: &ResourceQuery) -> Result<Vec<DynamicObject>, ClusterError> {
        let api = self.api(&query.gvk, query.namespace.as_deref()).await?;
        let list = api.list(&query.list_params()).await?;
        Ok(list.items)
    }

    fn watch(&self, query: &ResourceQuery) -> EventStream {
        let cluster = self.clone();
        let query = query.clone();
        stream::once(async move {
            match cluster.api(&query.gvk, query.namespace.as_deref()).await {
                Ok(api) => watcher(api, query.watcher_config())
                    .default_backoff()
                    .map_err(ClusterError::from)
                    .boxed(),
                Err(e) => stream::iter([Err(e)]).boxed(),
            }
        })
        .flatten()
        .boxed()
    }

    async fn served_kinds(&self) -> Result<Vec<ServedKind>, ClusterError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| ClusterError::Discovery {
                kind: "*".to_string(),
                message: e.to_string(),
            })?;

        let mut served = Vec::new();
        let mut kinds = self.kinds.write().await;
        for group in discovery.groups() {
            for (resource, capabilities) in group.recommended_resources() {
                let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
                served.push(ServedKind {
                    plural: resource.plural.clone(),
                    namespaced: matches!(capabilities.scope, Scope::Namespaced),
                    listable: capabilities.supports_operation(verbs::LIST),
                    gvk: gvk.clone(),
                });
                // Later lookups of the same kind skip discovery
                kinds.entry(kind_key(&gvk)).or_insert((resource, capabilities));
            }
        }
        debug!(cluster = %self.name, kinds = served.len(), "Discovered served kinds");
        Ok(served)
    }
}

fn kind_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}
