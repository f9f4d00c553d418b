//! Diagram Live
//!
//! Watches the resources bound to the nodes of a Mermaid diagram across one
//! or more clusters and keeps a styled copy of the diagram on disk.
//!
//! `diagram-live run` options can also be set through the environment:
//! - `CONFIG_PATH`: node selector configuration (YAML, required)
//! - `DIAGRAM_PATH`: Mermaid source of the diagram (required)
//! - `OUTPUT_PATH`: where the styled diagram is written (default `diagram.styled.mmd`)
//! - `KUBECONFIG_DIR`: directory of kubeconfig files, one cluster per context
//!   (default: the default kubeconfig)
//! - `CLUSTER_RESCAN_SECS`: how often the kubeconfigs are rescanned (default 5)
//!
//! `diagram-live generate` writes a starter config and diagram from the
//! resources found in the clusters.

mod cli;
mod controller;
mod error;
mod generate;
mod watch;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // kube talks TLS through rustls; pin the ring provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    match cli.command {
        Command::Run(settings) => {
            info!("Starting Diagram Live");
            info!("Configuration:");
            info!("  Config: {}", settings.config_path.display());
            info!("  Diagram: {}", settings.diagram_path.display());
            info!("  Output: {}", settings.output_path.display());
            info!("  Kubeconfigs: {}", settings.clusters.describe());
            info!("  Cluster rescan: {}s", settings.cluster_rescan_secs);

            let controller = Controller::new(settings).await?;
            controller.run().await?;
        }
        Command::Generate(args) => generate::run(&args).await?,
    }

    Ok(())
}
