//! Kubernetes resource watchers.
//!
//! Clusters are watched with `kube_runtime::Controller`, which takes care of
//! reconnects, requeues and per-object serialization.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::user_cluster::KubeconfigSecretProvider;
use crds::Cluster;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use resource_client::KubeClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub type ClusterReconciler = Reconciler<KubeClient, KubeconfigSecretProvider<KubeClient>>;

const ERROR_REQUEUE: Duration = Duration::from_secs(60);
const DEBOUNCE: Duration = Duration::from_secs(5);

/// Watches Cluster objects until the stream ends.
pub async fn watch_clusters(
    api: Api<Cluster>,
    reconciler: Arc<ClusterReconciler>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    info!("Starting Cluster watcher");

    let error_policy = |cluster: Arc<Cluster>, error: &ControllerError, _ctx: Arc<ClusterReconciler>| {
        error!("Reconciliation error for Cluster {}: {}", cluster.name_any(), error);
        Action::requeue(ERROR_REQUEUE)
    };

    let reconcile = |cluster: Arc<Cluster>, ctx: Arc<ClusterReconciler>| async move {
        debug!("Reconciling Cluster {}", cluster.name_any());
        ctx.reconcile_cluster(&cluster).await
    };

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for Cluster: {}", e);
            }
        })
        .await;

    Ok(())
}
