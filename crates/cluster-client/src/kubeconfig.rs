//! Clusters from kubeconfig files
//!
//! Every context of every kubeconfig becomes one named cluster. Context names
//! must be unique across all files that are loaded together.

use crate::client::KubeCluster;
use crate::error::ClusterError;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name suffixes picked up by [`clusters_from_directory`]
pub const KUBECONFIG_SUFFIXES: [&str; 3] = [".kubeconfig", ".kubeconfig.yaml", ".kubeconfig.yml"];

/// One cluster per context of the default kubeconfig (`$KUBECONFIG` or `~/.kube/config`)
pub async fn clusters_from_default_kubeconfig() -> Result<Vec<KubeCluster>, ClusterError> {
    let kubeconfig = Kubeconfig::read().map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;
    clusters_from_kubeconfig(&kubeconfig).await
}

/// One cluster per context found in kubeconfig files inside `dir`
pub async fn clusters_from_directory(dir: impl AsRef<Path>) -> Result<Vec<KubeCluster>, ClusterError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ClusterError::Kubeconfig(format!("failed to read directory {}: {e}", dir.display()))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_kubeconfig_file(path))
        .collect();
    paths.sort();

    clusters_from_files(&paths).await
}

/// One cluster per context across the given kubeconfig files
pub async fn clusters_from_files(paths: &[PathBuf]) -> Result<Vec<KubeCluster>, ClusterError> {
    let mut seen = HashSet::new();
    let mut kubeconfigs = Vec::with_capacity(paths.len());

    // Read everything first so a duplicate context fails before any client is built
    for path in paths {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            ClusterError::Kubeconfig(format!("failed to read {}: {e}", path.display()))
        })?;
        for context in &kubeconfig.contexts {
            if !seen.insert(context.name.clone()) {
                return Err(ClusterError::Kubeconfig(format!(
                    "duplicate context name {:?} found in file {}",
                    context.name,
                    path.display()
                )));
            }
        }
        kubeconfigs.push(kubeconfig);
    }

    let mut clusters = Vec::new();
    for kubeconfig in &kubeconfigs {
        clusters.extend(clusters_from_kubeconfig(kubeconfig).await?);
    }
    Ok(clusters)
}

async fn clusters_from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<Vec<KubeCluster>, ClusterError> {
    let mut clusters = Vec::with_capacity(kubeconfig.contexts.len());
    for context in &kubeconfig.contexts {
        let options = KubeConfigOptions {
            context: Some(context.name.clone()),
            ..Default::default()
        };
        let config = Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
            .await
            .map_err(|e| ClusterError::Kubeconfig(format!("context {}: {e}", context.name)))?;
        let client = Client::try_from(config)?;
        info!(cluster = %context.name, "Loaded cluster from kubeconfig context");
        clusters.push(KubeCluster::new(context.name.clone(), client));
    }
    Ok(clusters)
}

fn is_kubeconfig_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| KUBECONFIG_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}
