//! Starter config and diagram from what the clusters contain.
//!
//! Every listed resource becomes one node selected by exact name and healthy
//! while present. Kubernetes' own plumbing (API groups, kinds and well-known
//! objects created by the control plane) is left out unless `really_all` is
//! set.

use crate::cli::GenerateArgs;
use crate::error::ControllerError;
use clap::{Args, ValueEnum};
use cluster_client::{ClusterClient, ResourceQuery, ServedKind};
use diagram_config::{Config, Health, Node, NodeSelector, ResourceKind};
use kube::api::{DynamicObject, GroupVersionKind, ResourceExt};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

const EXCLUDED_GROUPS: [&str; 12] = [
    "admissionregistration.k8s.io",
    "apiregistration.k8s.io",
    "authentication.k8s.io",
    "authorization.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "policy",
    "scheduling.k8s.io",
    "storage.k8s.io",
];

/// Core kinds that are never useful as nodes
const EXCLUDED_CORE_KINDS: [&str; 3] = ["Namespace", "Node", "ComponentStatus"];

const EXCLUDED_NAMESPACES: [&str; 4] = [
    "kube-node-lease",
    "kube-public",
    "kube-system",
    "local-path-storage",
];

const BOOTSTRAPPING_LABEL: &str = "kubernetes.io/bootstrapping";

/// Objects the control plane creates on its own: (group, kind, name prefixes, exact names)
const EXCLUDED_OBJECTS: [(&str, &str, &[&str], &[&str]); 7] = [
    (
        "rbac.authorization.k8s.io",
        "ClusterRole",
        &["system:", "kubeadm:", "local-path-provisioner"],
        &["kindnet"],
    ),
    (
        "rbac.authorization.k8s.io",
        "ClusterRoleBinding",
        &["system:", "kubeadm:", "local-path-provisioner"],
        &["kindnet"],
    ),
    ("", "ConfigMap", &[], &["kube-root-ca.crt"]),
    ("", "ServiceAccount", &[], &["default"]),
    ("", "Endpoints", &[], &["kubernetes"]),
    ("", "Service", &[], &["kubernetes"]),
    ("discovery.k8s.io", "EndpointSlice", &[], &["kubernetes"]),
];

/// Which resources to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum ScopeFilter {
    /// Cluster-scoped resources
    Cluster,
    /// Namespaced resources
    Namespaced,
}

/// What `generate` exports
#[derive(Debug, Clone, Args)]
pub struct GenerateOptions {
    /// Comma-separated clusters to export; all when empty
    #[arg(long, value_delimiter = ',')]
    pub clusters: Vec<String>,

    /// Comma-separated scopes to export
    #[arg(
        long,
        short = 's',
        value_delimiter = ',',
        value_enum,
        default_values_t = [ScopeFilter::Cluster, ScopeFilter::Namespaced]
    )]
    pub scopes: Vec<ScopeFilter>,

    /// Comma-separated namespaces to export; all when empty
    #[arg(long, short = 'n', value_delimiter = ',')]
    pub namespaces: Vec<String>,

    /// Also export Kubernetes' own resources
    #[arg(long)]
    pub really_all: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            scopes: vec![ScopeFilter::Cluster, ScopeFilter::Namespaced],
            namespaces: Vec::new(),
            really_all: false,
        }
    }
}

/// Generated configuration and Mermaid source
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub config: Config,
    pub diagram: String,
}

/// Load clusters, generate and write both files
pub async fn run(args: &GenerateArgs) -> Result<(), ControllerError> {
    info!(source = %args.clusters.describe(), "Loading clusters");
    let clusters: Vec<Arc<dyn ClusterClient>> = args
        .clusters
        .load()
        .await?
        .into_iter()
        .map(|cluster| Arc::new(cluster) as Arc<dyn ClusterClient>)
        .collect();

    let generated = generate(&clusters, &args.options).await?;
    generated.config.validate()?;

    let yaml = serde_yaml::to_string(&generated.config)?;
    write(&args.config_path, &yaml).await?;
    write(&args.diagram_path, &generated.diagram).await?;
    info!(
        nodes = generated.config.nodes.len(),
        config = %args.config_path.display(),
        diagram = %args.diagram_path.display(),
        "Wrote generated files"
    );
    Ok(())
}

async fn write(path: &std::path::Path, contents: &str) -> Result<(), ControllerError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ControllerError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Build a config and diagram covering the selected clusters
pub async fn generate(
    clusters: &[Arc<dyn ClusterClient>],
    options: &GenerateOptions,
) -> Result<Generated, ControllerError> {
    let mut selected: Vec<&Arc<dyn ClusterClient>> = clusters
        .iter()
        .filter(|c| options.clusters.is_empty() || options.clusters.iter().any(|n| n == c.name()))
        .collect();
    selected.sort_by(|a, b| a.name().cmp(b.name()));

    for wanted in &options.clusters {
        if !selected.iter().any(|c| c.name() == wanted) {
            return Err(ControllerError::InvalidConfig(format!("unknown cluster {wanted:?}")));
        }
    }

    let mut config = Config::default();
    let mut diagram = String::from("flowchart TD\n");

    for cluster in selected {
        let cluster = cluster.as_ref();
        let cluster_name = cluster.name();
        let kinds = exported_kinds(cluster.served_kinds().await?, options.really_all);
        debug!(cluster = %cluster_name, kinds = kinds.len(), "Exporting kinds");

        let _ = writeln!(diagram, "  subgraph {} [Cluster: {cluster_name}]", node_id(&[cluster_name]));

        if options.scopes.contains(&ScopeFilter::Cluster) {
            for kind in kinds.iter().filter(|k| !k.namespaced) {
                for (node_name, node, line) in gather(cluster, kind, None, options).await? {
                    let _ = writeln!(diagram, "    {line}");
                    config.nodes.insert(node_name, node);
                }
            }
        }

        if options.scopes.contains(&ScopeFilter::Namespaced) {
            let namespaces = if options.namespaces.is_empty() {
                namespaces(cluster, options.really_all).await?
            } else {
                options.namespaces.clone()
            };

            for namespace in &namespaces {
                let _ = writeln!(
                    diagram,
                    "    subgraph {} [Namespace: {namespace}]",
                    node_id(&[cluster_name, namespace.as_str()])
                );
                for kind in kinds.iter().filter(|k| k.namespaced) {
                    for (node_name, node, line) in gather(cluster, kind, Some(namespace.as_str()), options).await? {
                        let _ = writeln!(diagram, "      {line}");
                        config.nodes.insert(node_name, node);
                    }
                }
                diagram.push_str("    end\n");
            }
        }

        diagram.push_str("  end\n");
    }

    Ok(Generated { config, diagram })
}

/// Listable kinds, minus the excluded ones, in a stable order
fn exported_kinds(mut kinds: Vec<ServedKind>, really_all: bool) -> Vec<ServedKind> {
    kinds.retain(|kind| {
        kind.listable
            && (really_all
                || !(EXCLUDED_GROUPS.contains(&kind.gvk.group.as_str())
                    || (kind.gvk.group.is_empty()
                        && EXCLUDED_CORE_KINDS.contains(&kind.gvk.kind.as_str()))))
    });
    kinds.sort_by(|a, b| {
        (&a.gvk.group, &a.gvk.kind, &a.gvk.version).cmp(&(&b.gvk.group, &b.gvk.kind, &b.gvk.version))
    });
    kinds
}

async fn namespaces(cluster: &dyn ClusterClient, really_all: bool) -> Result<Vec<String>, ControllerError> {
    let query = ResourceQuery::new(GroupVersionKind::gvk("", "v1", "Namespace"));
    let listed = match cluster.list(&query).await {
        Ok(listed) => listed,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let names: BTreeSet<String> = listed
        .iter()
        .filter(|ns| really_all || !(has_bootstrapping_label(ns) || EXCLUDED_NAMESPACES.contains(&ns.name_any().as_str())))
        .map(ResourceExt::name_any)
        .collect();
    Ok(names.into_iter().collect())
}

async fn gather(
    cluster: &dyn ClusterClient,
    kind: &ServedKind,
    namespace: Option<&str>,
    options: &GenerateOptions,
) -> Result<Vec<(String, Node, String)>, ControllerError> {
    let mut query = ResourceQuery::new(kind.gvk.clone());
    if let Some(ns) = namespace {
        query = query.namespace(ns);
    }
    if !options.really_all {
        query = query.labels(format!("!{BOOTSTRAPPING_LABEL}"));
    }

    let mut objects = match cluster.list(&query).await {
        Ok(objects) => objects,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    objects.retain(|obj| options.really_all || !skip_object(kind, obj));
    objects.sort_by_key(ResourceExt::name_any);

    let cluster_name = cluster.name();
    Ok(objects
        .iter()
        .map(|obj| {
            let name = obj.name_any();
            let node_name = match namespace {
                Some(ns) => node_id(&[cluster_name, ns, kind.plural.as_str(), name.as_str()]),
                None => node_id(&[cluster_name, kind.plural.as_str(), name.as_str()]),
            };
            let line = format!("{node_name}[{}: {name}]", kind.gvk.kind);
            let node = Node {
                selector: NodeSelector {
                    cluster_name: cluster_name.to_string(),
                    gvk: ResourceKind::new(&kind.gvk.group, &kind.gvk.version, &kind.gvk.kind),
                    name: Some(name),
                    namespace: namespace.map(str::to_string),
                    label_selector: None,
                    owner: None,
                },
                health: Health {
                    want_present_only: true,
                    condition_type: None,
                },
                label: None,
            };
            (node_name, node, line)
        })
        .collect())
}

fn has_bootstrapping_label(obj: &DynamicObject) -> bool {
    obj.labels().contains_key(BOOTSTRAPPING_LABEL)
}

fn skip_object(kind: &ServedKind, obj: &DynamicObject) -> bool {
    if obj.metadata.generate_name.as_deref().is_some_and(|g| !g.is_empty()) || has_bootstrapping_label(obj) {
        return true;
    }
    let name = obj.name_any();
    EXCLUDED_OBJECTS.iter().any(|(group, excluded_kind, prefixes, names)| {
        *group == kind.gvk.group
            && *excluded_kind == kind.gvk.kind
            && (prefixes.iter().any(|p| name.starts_with(p)) || names.contains(&name.as_str()))
    })
}

/// Mermaid-safe node id from parts joined by `-`
fn node_id(parts: &[&str]) -> String {
    parts
        .join("-")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockCluster;
    use std::collections::BTreeMap;

    fn deployments() -> GroupVersionKind {
        GroupVersionKind::gvk("apps", "v1", "Deployment")
    }

    fn cluster_roles() -> GroupVersionKind {
        GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole")
    }

    fn namespace(name: &str) -> DynamicObject {
        MockCluster::object(&GroupVersionKind::gvk("", "v1", "Namespace"), None, name)
    }

    fn shop_cluster() -> MockCluster {
        let cluster = MockCluster::new("prod");
        cluster.apply(namespace("shop"));
        cluster.apply(namespace("kube-system"));
        cluster.apply(MockCluster::object(&deployments(), Some("shop"), "api"));
        cluster.apply(MockCluster::object(&deployments(), Some("kube-system"), "coredns"));
        cluster.apply(MockCluster::object(&cluster_roles(), None, "admin"));
        cluster.apply(MockCluster::object(&cluster_roles(), None, "system:controller"));
        cluster.apply(MockCluster::object(
            &GroupVersionKind::gvk("", "v1", "ConfigMap"),
            Some("shop"),
            "kube-root-ca.crt",
        ));
        cluster
    }

    fn handles(clusters: &[&MockCluster]) -> Vec<Arc<dyn ClusterClient>> {
        clusters
            .iter()
            .map(|c| Arc::new((*c).clone()) as Arc<dyn ClusterClient>)
            .collect()
    }

    #[tokio::test]
    async fn test_generate_skips_kubernetes_defaults() {
        let cluster = shop_cluster();
        let generated = generate(&handles(&[&cluster]), &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(
            generated.diagram,
            "flowchart TD\n\
             \x20 subgraph prod [Cluster: prod]\n\
             \x20   prod-clusterroles-admin[ClusterRole: admin]\n\
             \x20   subgraph prod-shop [Namespace: shop]\n\
             \x20     prod-shop-deployments-api[Deployment: api]\n\
             \x20   end\n\
             \x20 end\n"
        );

        let names: Vec<&String> = generated.config.nodes.keys().collect();
        assert_eq!(names, vec!["prod-clusterroles-admin", "prod-shop-deployments-api"]);

        let api = &generated.config.nodes["prod-shop-deployments-api"];
        assert_eq!(api.selector.cluster_name, "prod");
        assert_eq!(api.selector.gvk, ResourceKind::new("apps", "v1", "Deployment"));
        assert_eq!(api.selector.name.as_deref(), Some("api"));
        assert_eq!(api.selector.namespace.as_deref(), Some("shop"));
        assert!(api.health.want_present_only);
        assert!(generated.config.validate().is_ok(), "Generated config must be valid");

        let admin = &generated.config.nodes["prod-clusterroles-admin"];
        assert_eq!(admin.selector.namespace, None);
    }

    #[tokio::test]
    async fn test_generate_really_all_keeps_everything() {
        let cluster = shop_cluster();
        let options = GenerateOptions {
            really_all: true,
            ..GenerateOptions::default()
        };
        let generated = generate(&handles(&[&cluster]), &options).await.unwrap();

        let nodes = &generated.config.nodes;
        assert!(nodes.contains_key("prod-clusterroles-system_controller"), "Got {:?}", nodes.keys());
        assert!(nodes.contains_key("prod-kube-system-deployments-coredns"));
        assert!(nodes.contains_key("prod-shop-configmaps-kube-root-ca_crt"));
        assert!(nodes.contains_key("prod-namespaces-shop"), "Namespaces are exported too");
    }

    #[tokio::test]
    async fn test_generate_respects_scope_namespace_and_cluster_filters() {
        let prod = shop_cluster();
        let staging = MockCluster::new("staging");
        staging.apply(namespace("shop"));
        staging.apply(MockCluster::object(&deployments(), Some("shop"), "api"));
        let clusters = handles(&[&staging, &prod]);

        let options = GenerateOptions {
            clusters: vec!["staging".to_string()],
            scopes: vec![ScopeFilter::Namespaced],
            namespaces: vec!["shop".to_string()],
            really_all: false,
        };
        let generated = generate(&clusters, &options).await.unwrap();
        assert_eq!(
            generated.config.nodes.keys().collect::<Vec<_>>(),
            vec!["staging-shop-deployments-api"]
        );

        let options = GenerateOptions {
            scopes: vec![ScopeFilter::Cluster],
            ..GenerateOptions::default()
        };
        let generated = generate(&clusters, &options).await.unwrap();
        assert_eq!(
            generated.config.nodes.keys().collect::<Vec<_>>(),
            vec!["prod-clusterroles-admin"]
        );
        assert!(
            generated.diagram.find("subgraph prod ") < generated.diagram.find("subgraph staging "),
            "Clusters are emitted in name order"
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_unknown_cluster() {
        let cluster = shop_cluster();
        let options = GenerateOptions {
            clusters: vec!["nope".to_string()],
            ..GenerateOptions::default()
        };
        let err = generate(&handles(&[&cluster]), &options).await.unwrap_err();
        assert!(err.to_string().contains("nope"), "Got {err}");
    }

    #[tokio::test]
    async fn test_generate_skips_generated_and_bootstrapping_objects() {
        let cluster = MockCluster::new("c1");
        cluster.apply(namespace("shop"));
        let mut generated_name = MockCluster::object(&deployments(), Some("shop"), "api-x7f2");
        generated_name.metadata.generate_name = Some("api-".to_string());
        cluster.apply(generated_name);
        let mut bootstrap = MockCluster::object(&deployments(), Some("shop"), "seed");
        bootstrap.metadata.labels = Some(BTreeMap::from([(BOOTSTRAPPING_LABEL.to_string(), "rbac-defaults".to_string())]));
        cluster.apply(bootstrap);
        cluster.apply(MockCluster::object(&deployments(), Some("shop"), "web"));

        let generated = generate(&handles(&[&cluster]), &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(
            generated.config.nodes.keys().collect::<Vec<_>>(),
            vec!["c1-shop-deployments-web"]
        );
    }

    #[test]
    fn test_node_id_is_mermaid_safe() {
        assert_eq!(node_id(&["c1", "kube-root-ca.crt"]), "c1-kube-root-ca_crt");
        assert_eq!(node_id(&["c1", "system:auth"]), "c1-system_auth");
    }

    #[test]
    fn test_exported_kinds_drop_excluded_and_unlistable() {
        let kind = |group: &str, kind: &str, listable: bool| ServedKind {
            gvk: GroupVersionKind::gvk(group, "v1", kind),
            plural: format!("{}s", kind.to_lowercase()),
            namespaced: true,
            listable,
        };
        let kinds = vec![
            kind("apps", "Deployment", true),
            kind("policy", "PodDisruptionBudget", true),
            kind("", "Node", true),
            kind("", "Pod", true),
            kind("", "Binding", false),
        ];

        let exported: Vec<String> = exported_kinds(kinds.clone(), false)
            .into_iter()
            .map(|k| k.gvk.kind)
            .collect();
        assert_eq!(exported, vec!["Pod", "Deployment"], "Core group sorts first");

        assert_eq!(exported_kinds(kinds, true).len(), 4, "Unlistable kinds are always dropped");
    }
}
