//! Watches EtcdBackupConfigs in all namespaces.
//!
//! Jobs owned by the controller are not watched; running jobs are polled
//! through the requeue delays the reconciler returns.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::EtcdBackupConfig;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use resource_client::KubeClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub type BackupReconciler = Reconciler<KubeClient>;

const ERROR_REQUEUE: Duration = Duration::from_secs(60);
const DEBOUNCE: Duration = Duration::from_secs(1);

pub async fn watch_backup_configs(
    api: Api<EtcdBackupConfig>,
    reconciler: Arc<BackupReconciler>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    info!("Starting EtcdBackupConfig watcher");

    let error_policy =
        |config: Arc<EtcdBackupConfig>, error: &ControllerError, _ctx: Arc<BackupReconciler>| {
            error!(
                "Reconciliation error for EtcdBackupConfig {}/{}: {}",
                config.namespace().unwrap_or_default(),
                config.name_any(),
                error
            );
            Action::requeue(ERROR_REQUEUE)
        };

    let reconcile = |config: Arc<EtcdBackupConfig>, ctx: Arc<BackupReconciler>| async move {
        debug!("Reconciling EtcdBackupConfig {}", config.name_any());
        ctx.reconcile_backup_config(&config).await
    };

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for EtcdBackupConfig: {}", e);
            }
        })
        .await;

    Ok(())
}
