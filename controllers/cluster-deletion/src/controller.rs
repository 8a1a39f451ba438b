//! Main controller implementation.
//!
//! Wires the seed client, the user cluster client provider and the metrics
//! endpoint together and runs the Cluster watcher.

use crate::deletion::Deletion;
use crate::error::ControllerError;
use crate::metrics::{self, DeletionMetrics};
use crate::reconciler::Reconciler;
use crate::user_cluster::KubeconfigSecretProvider;
use crate::watcher::watch_clusters;
use crds::Cluster;
use kube::{Api, Client};
use kubernetes_helper::{Clock, EventRecorder, SystemClock};
use resource_client::KubeClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub const COMPONENT: &str = "kubermatic-cluster-deletion-controller";

/// Runtime settings, read from the environment by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub metrics_addr: SocketAddr,
    pub kubermatic_namespace: String,
    pub concurrency: u16,
}

/// Main controller for cluster deletion.
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Cluster Deletion Controller");

        let kube_client = Client::try_default().await?;
        let seed = Arc::new(KubeClient::new(kube_client.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let recorder = EventRecorder::kube(kube_client.clone(), COMPONENT);
        let metrics = DeletionMetrics::new().map_err(|e| ControllerError::Metrics(e.to_string()))?;

        let deletion = Deletion::new(
            Arc::clone(&seed),
            Arc::new(KubeconfigSecretProvider::new(Arc::clone(&seed))),
            recorder.clone(),
            clock,
            metrics.clone(),
            config.kubermatic_namespace,
        );
        let reconciler = Arc::new(Reconciler::new(deletion, recorder));

        let cluster_api: Api<Cluster> = Api::all(kube_client);
        let concurrency = config.concurrency;
        let cluster_watcher =
            tokio::spawn(async move { watch_clusters(cluster_api, reconciler, concurrency).await });

        let metrics_addr = config.metrics_addr;
        let metrics_server = tokio::spawn(async move { metrics::serve(metrics_addr, metrics).await });

        Ok(Self {
            cluster_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Cluster Deletion Controller running");

        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Cluster watcher panicked: {}", e)))??;
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Metrics(format!("Metrics server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
