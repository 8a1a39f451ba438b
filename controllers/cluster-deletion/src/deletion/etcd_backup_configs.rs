use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, EtcdBackupConfig, ETCD_BACKUP_CONFIG_CLEANUP_FINALIZER};
use kubernetes_helper::{has_finalizer, is_deleting};
use resource_client::{ignore_not_found, KubeClientTrait, ListOptions};

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes the backup configs of the cluster and waits for the backup
    /// controller to finish tearing them down.
    pub(super) async fn cleanup_etcd_backup_configs(&self, cluster: &mut Cluster) -> Result<bool, DeletionError> {
        if !has_finalizer(cluster, &[ETCD_BACKUP_CONFIG_CLEANUP_FINALIZER]) {
            return Ok(true);
        }

        let namespace = cluster.namespace_name().to_string();
        if !namespace.is_empty() {
            let configs: Vec<EtcdBackupConfig> = self
                .seed
                .list(&ListOptions::namespaced(&namespace))
                .await
                .context(format!("failed to list EtcdBackupConfigs in {namespace}"))?;

            for config in configs.iter().filter(|config| !is_deleting(*config)) {
                ignore_not_found(self.seed.delete(config, None).await)
                    .context("failed to delete EtcdBackupConfig")?;
            }

            if !configs.is_empty() {
                self.recorder
                    .normal(
                        &*cluster,
                        "EtcdBackupConfigCleanup",
                        format!("waiting for {} EtcdBackupConfigs to be deleted", configs.len()),
                    )
                    .await;
                return Ok(false);
            }
        }

        self.remove_finalizer(cluster, ETCD_BACKUP_CONFIG_CLEANUP_FINALIZER)
            .await?;
        Ok(true)
    }
}
