//! Main controller implementation.

use crate::config::BackupSettings;
use crate::error::ControllerError;
use crate::naming::random_suffix_generator;
use crate::reconciler::Reconciler;
use crate::watcher::watch_backup_configs;
use crds::EtcdBackupConfig;
use kube::{Api, Client};
use kubernetes_helper::{Clock, EventRecorder, SystemClock};
use resource_client::KubeClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub const COMPONENT: &str = "kkp-etcd-backup-controller";

/// Runtime settings, read from the environment by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub concurrency: u16,
    pub backup: BackupSettings,
}

/// Main controller for etcd backups.
pub struct Controller {
    backup_config_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Etcd Backup Controller");

        let kube_client = Client::try_default().await?;
        let seed = Arc::new(KubeClient::new(kube_client.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let recorder = EventRecorder::kube(kube_client.clone(), COMPONENT);

        let reconciler = Arc::new(Reconciler::new(
            seed,
            recorder,
            clock,
            random_suffix_generator(),
            config.backup,
        ));

        let api: Api<EtcdBackupConfig> = Api::all(kube_client);
        let concurrency = config.concurrency;
        let backup_config_watcher =
            tokio::spawn(async move { watch_backup_configs(api, reconciler, concurrency).await });

        Ok(Self { backup_config_watcher })
    }

    /// Runs the controller until the watcher stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Etcd Backup Controller running");

        self.backup_config_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("EtcdBackupConfig watcher panicked: {}", e)))??;

        Ok(())
    }
}
