use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, CLUSTER_NAME_LABEL, SERVICE_ACCOUNTS_CLEANUP_FINALIZER};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::ResourceExt;
use kubernetes_helper::{has_finalizer, is_deleting};
use resource_client::{ignore_not_found, KubeClientTrait, ListOptions};

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes the seed service accounts created for this cluster.
    pub(super) async fn cleanup_service_accounts(&self, cluster: &mut Cluster) -> Result<bool, DeletionError> {
        if !has_finalizer(cluster, &[SERVICE_ACCOUNTS_CLEANUP_FINALIZER]) {
            return Ok(true);
        }

        let selector = format!("{}={}", CLUSTER_NAME_LABEL, cluster.name_any());
        let accounts: Vec<ServiceAccount> = self
            .seed
            .list(&ListOptions::all().labels(selector))
            .await
            .context("failed to list service accounts")?;

        for account in accounts.iter().filter(|account| !is_deleting(*account)) {
            ignore_not_found(self.seed.delete(account, None).await).context(format!(
                "failed to delete service account {}/{}",
                account.namespace().unwrap_or_default(),
                account.name_any()
            ))?;
        }

        if !accounts.is_empty() {
            self.recorder
                .normal(
                    &*cluster,
                    "ServiceAccountCleanup",
                    format!("waiting for {} service accounts to be deleted", accounts.len()),
                )
                .await;
            return Ok(false);
        }

        self.remove_finalizer(cluster, SERVICE_ACCOUNTS_CLEANUP_FINALIZER)
            .await?;
        Ok(true)
    }
}
