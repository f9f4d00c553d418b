//! Cluster access for diagram-live
//!
//! A cluster is anything that can get, list and watch resources of a given
//! kind. The styler only talks to the [`ClusterClient`] trait; the concrete
//! [`KubeCluster`] is backed by a `kube::Client` and resolves kinds through
//! API discovery.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{clusters_from_default_kubeconfig, ClusterClient, ResourceQuery};
//! use kube::api::GroupVersionKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! for cluster in clusters_from_default_kubeconfig().await? {
//!     let query = ResourceQuery::new(GroupVersionKind::gvk("apps", "v1", "Deployment"))
//!         .namespace("default")
//!         .labels("app=payments");
//!     let deployments = cluster.list(&query).await?;
//!     println!("{}: {} deployments", cluster.name(), deployments.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod kubeconfig;
pub mod query;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeCluster;
pub use cluster_trait::{ClusterClient, EventStream};
pub use error::ClusterError;
pub use kubeconfig::{clusters_from_default_kubeconfig, clusters_from_directory, clusters_from_files};
pub use query::{ResourceQuery, ServedKind};
#[cfg(feature = "test-util")]
pub use mock::MockCluster;
