//! Command line interface.
//!
//! Every option of `run` can also be given through the environment, which is
//! how the container image is configured.

use crate::generate::GenerateOptions;
use clap::{Args, Parser, Subcommand};
use cluster_client::{ClusterError, KubeCluster, clusters_from_default_kubeconfig, clusters_from_directory};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT_PATH: &str = "diagram.styled.mmd";

#[derive(Debug, Parser)]
#[command(name = "diagram-live", version)]
#[command(about = "Style a Mermaid diagram with the live health of Kubernetes resources", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep the styled diagram up to date
    Run(Settings),
    /// Write a starter config and diagram from the resources found in the clusters
    Generate(GenerateArgs),
}

/// Where clusters come from
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ClusterSource {
    /// Directory of kubeconfig files, one cluster per context.
    /// The default kubeconfig is used when unset.
    #[arg(long = "kubeconfig-dir", env = "KUBECONFIG_DIR")]
    pub kubeconfig_dir: Option<PathBuf>,
}

impl ClusterSource {
    /// Load every cluster this source currently describes
    pub async fn load(&self) -> Result<Vec<KubeCluster>, ClusterError> {
        match &self.kubeconfig_dir {
            Some(dir) => clusters_from_directory(dir).await,
            None => clusters_from_default_kubeconfig().await,
        }
    }

    /// Human readable description for logs
    pub fn describe(&self) -> String {
        self.kubeconfig_dir
            .as_ref()
            .map_or_else(|| "default kubeconfig".to_string(), |d| d.display().to_string())
    }
}

/// Settings of `run`
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Settings {
    /// Node selector configuration (YAML)
    #[arg(long = "config", env = "CONFIG_PATH")]
    pub config_path: PathBuf,

    /// Mermaid source of the diagram
    #[arg(long = "diagram", env = "DIAGRAM_PATH")]
    pub diagram_path: PathBuf,

    /// Where the styled diagram is written
    #[arg(long = "output", env = "OUTPUT_PATH", default_value = DEFAULT_OUTPUT_PATH)]
    pub output_path: PathBuf,

    #[command(flatten)]
    pub clusters: ClusterSource,

    /// Seconds between rescans of the kubeconfig files
    #[arg(
        long = "cluster-rescan-secs",
        env = "CLUSTER_RESCAN_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub cluster_rescan_secs: u64,
}

impl Settings {
    /// Interval between kubeconfig rescans
    pub fn cluster_rescan_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_rescan_secs)
    }
}

/// Arguments of `generate`
#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Where the generated configuration is written
    #[arg(long = "config", env = "CONFIG_PATH")]
    pub config_path: PathBuf,

    /// Where the generated diagram is written
    #[arg(long = "diagram", env = "DIAGRAM_PATH")]
    pub diagram_path: PathBuf,

    #[command(flatten)]
    pub clusters: ClusterSource,

    #[command(flatten)]
    pub options: GenerateOptions,
}
