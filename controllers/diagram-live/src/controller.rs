//! Main controller implementation.
//!
//! Loads clusters at startup, then runs three background tasks:
//! - the reload task re-reads the config or diagram whenever the file watcher
//!   reports a change and applies it
//! - the cluster task rescans the kubeconfigs and engages or disengages
//!   clusters that appeared or went away
//! - the writer task rewrites the styled diagram whenever the diagram or the
//!   styling changes

use crate::cli::{ClusterSource, Settings};
use crate::error::ControllerError;
use crate::watch::{FileSource, FileWatcher};
use cluster_client::ClusterClient;
use diagram_config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use styler::{Multiplexer, Styler};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Main controller for Diagram Live.
pub struct Controller {
    settings: Settings,
    styler: Arc<Styler>,
}

impl Controller {
    /// Creates a new controller and engages every configured cluster.
    pub async fn new(settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing Diagram Live controller");

        let clusters = load_clusters(&settings.clusters).await?;
        if clusters.is_empty() {
            warn!("No clusters found, every node will show as absent");
        }

        let multiplexer = Arc::new(Multiplexer::new());
        multiplexer.sync(clusters)?;

        Ok(Self {
            settings,
            styler: Arc::new(Styler::new(multiplexer)),
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(&self) -> Result<(), ControllerError> {
        // Watch before the first read so no change in between is missed
        let watcher = FileWatcher::new(&[
            self.settings.config_path.as_path(),
            self.settings.diagram_path.as_path(),
        ])?;

        // A broken config at startup is fatal; later reloads only log
        let mut config_source = FileSource::new(&self.settings.config_path);
        let raw = config_source.reload().await?.unwrap_or_default();
        let config = Config::parse(&raw)?;
        info!(nodes = config.nodes.len(), "Loaded configuration");
        if let Err(e) = self.styler.update_config(&config) {
            warn!("Some nodes could not be started: {}", e);
        }

        let (diagram_tx, diagram_rx) = watch::channel(None::<String>);

        let mut reload: JoinHandle<Result<(), ControllerError>> = {
            let styler = Arc::clone(&self.styler);
            let diagram_source = FileSource::new(&self.settings.diagram_path);
            tokio::spawn(async move {
                run_reload(&styler, watcher, config_source, diagram_source, &diagram_tx).await
            })
        };

        let mut clusters: JoinHandle<Result<(), ControllerError>> = {
            let multiplexer = Arc::clone(self.styler.multiplexer());
            let source = self.settings.clusters.clone();
            let every = self.settings.cluster_rescan_interval();
            tokio::spawn(async move { run_cluster_sync(&multiplexer, &source, every).await })
        };

        let mut writer: JoinHandle<Result<(), ControllerError>> = {
            let styler = Arc::clone(&self.styler);
            let output = self.settings.output_path.clone();
            tokio::spawn(async move { run_writer(&styler, &output, diagram_rx).await })
        };

        let result = tokio::select! {
            result = &mut reload => flatten("reload", result),
            result = &mut clusters => flatten("cluster", result),
            result = &mut writer => flatten("writer", result),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down");
                Ok(())
            }
        };

        reload.abort();
        clusters.abort();
        writer.abort();
        self.styler.shutdown();
        result
    }
}

fn flatten(
    task: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(ControllerError::Task(format!("{task} task: {e}"))),
    }
}

async fn load_clusters(source: &ClusterSource) -> Result<Vec<Arc<dyn ClusterClient>>, ControllerError> {
    Ok(source
        .load()
        .await?
        .into_iter()
        .map(|cluster| Arc::new(cluster) as Arc<dyn ClusterClient>)
        .collect())
}

async fn run_reload(
    styler: &Styler,
    mut watcher: FileWatcher,
    mut config_source: FileSource,
    mut diagram_source: FileSource,
    diagram_tx: &watch::Sender<Option<String>>,
) -> Result<(), ControllerError> {
    publish_diagram(&mut diagram_source, diagram_tx).await?;

    while let Some(changed) = watcher.changed().await {
        if changed == config_source.path() {
            match config_source.reload().await {
                Ok(Some(raw)) => match Config::parse(&raw) {
                    Ok(config) => {
                        info!("Configuration changed, applying");
                        if let Err(e) = styler.update_config(&config) {
                            warn!("Some nodes could not be started: {}", e);
                        }
                    }
                    Err(e) => error!("Ignoring invalid configuration: {}", e),
                },
                Ok(None) => debug!("Configuration rewritten without changes"),
                Err(e) => warn!("{}", e),
            }
        }
        if changed == diagram_source.path() {
            publish_diagram(&mut diagram_source, diagram_tx).await?;
        }
    }

    Err(ControllerError::Task("file watcher stopped".to_string()))
}

async fn publish_diagram(
    source: &mut FileSource,
    diagram_tx: &watch::Sender<Option<String>>,
) -> Result<(), ControllerError> {
    match source.reload().await {
        Ok(Some(diagram)) => {
            debug!(path = %source.path().display(), "Diagram changed");
            if diagram_tx.send(Some(diagram)).is_err() {
                return Err(ControllerError::Task("writer task stopped".to_string()));
            }
        }
        Ok(None) => {}
        // Removed or half-written files show up again on the next event
        Err(e) => warn!("{}", e),
    }
    Ok(())
}

async fn run_cluster_sync(
    multiplexer: &Multiplexer,
    source: &ClusterSource,
    every: Duration,
) -> Result<(), ControllerError> {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and startup already loaded clusters
    interval.tick().await;

    loop {
        interval.tick().await;
        match load_clusters(source).await {
            Ok(clusters) => {
                if let Err(e) = multiplexer.sync(clusters) {
                    warn!("Some clusters could not be engaged: {}", e);
                }
            }
            Err(e) => warn!(source = %source.describe(), "Failed to rescan clusters: {}", e),
        }
    }
}

async fn run_writer(
    styler: &Styler,
    output: &Path,
    mut diagram_rx: watch::Receiver<Option<String>>,
) -> Result<(), ControllerError> {
    let mut styling_rx = styler.subscribe();

    loop {
        tokio::select! {
            changed = diagram_rx.changed() => {
                if changed.is_err() {
                    return Err(ControllerError::Task("reload task stopped".to_string()));
                }
            }
            changed = styling_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }

        let diagram = diagram_rx.borrow_and_update().clone();
        styling_rx.mark_unchanged();
        let Some(diagram) = diagram else {
            // Nothing to style until the diagram has been read
            continue;
        };

        let styled = assemble(&diagram, &styler.get_styling());
        if let Err(e) = write_atomic(output, &styled).await {
            error!("Failed to write styled diagram: {}", e);
        } else {
            debug!(path = %output.display(), "Wrote styled diagram");
        }
    }
}

/// Diagram source followed by the styling block
fn assemble(diagram: &str, styling: &str) -> String {
    format!("{diagram}\n{styling}")
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), ControllerError> {
    let io_err = |source| ControllerError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}
