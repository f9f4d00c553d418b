//! Diagram Live configuration
//!
//! Declarative model of the nodes rendered on a diagram and the cluster
//! resources each node is bound to.
//!
//! A configuration file looks like:
//!
//! ```yaml
//! style:
//!   status:
//!     healthy: "stroke:#00AA00,stroke-width:2px"
//! nodes:
//!   db:
//!     selector:
//!       clusterName: c1
//!       gvk: { group: example.com, version: v1, kind: Database }
//!       labelSelector:
//!         matchLabels: { app: payments }
//!     health:
//!       wantPresentOnly: true
//!     label: '"replicas: " + string(size(resources))'
//! ```

pub mod error;
pub mod model;
pub mod parse;
pub mod selector;
pub mod status;
mod validate;

pub use error::ConfigError;
pub use model::*;
pub use selector::*;
pub use status::ResourceStatus;
