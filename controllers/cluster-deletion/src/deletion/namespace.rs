use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Addon, Cluster, NAMESPACE_CLEANUP_FINALIZER};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use kubernetes_helper::{has_finalizer, is_deleting};
use resource_client::{ignore_not_found, KubeClientTrait, ListOptions};
use tracing::info;

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes the cluster namespace once its addons are gone. The namespace
    /// name is cleared from the status only after the namespace has
    /// disappeared, other controllers use it to decide whether to act.
    pub(super) async fn delete_cluster_namespace(&self, cluster: &mut Cluster) -> Result<bool, DeletionError> {
        if !has_finalizer(cluster, &[NAMESPACE_CLEANUP_FINALIZER]) {
            return Ok(true);
        }

        let name = cluster.namespace_name().to_string();
        if name.is_empty() {
            self.remove_finalizer(cluster, NAMESPACE_CLEANUP_FINALIZER)
                .await?;
            return Ok(true);
        }

        if !self.cleanup_addons(cluster, &name).await? {
            return Ok(false);
        }

        let namespace = ignore_not_found(self.seed.get::<Namespace>(None, &name).await)
            .context(format!("failed to get namespace {name}"))?;

        if let Some(namespace) = namespace {
            if !is_deleting(&namespace) {
                ignore_not_found(self.seed.delete(&namespace, None).await)
                    .context(format!("failed to delete namespace {name}"))?;
                info!("Deleting namespace {} of cluster {}", name, cluster.name_any());
            }
            self.recorder
                .normal(
                    &*cluster,
                    "ClusterNamespaceCleanup",
                    format!("waiting for namespace {name} to be deleted"),
                )
                .await;
            return Ok(false);
        }

        let mut updated = cluster.clone();
        if let Some(status) = updated.status.as_mut() {
            status.namespace_name = String::new();
        }
        *cluster = self
            .seed
            .patch_status(cluster, &updated)
            .await
            .context("failed to clear namespace from cluster status")?;

        self.remove_finalizer(cluster, NAMESPACE_CLEANUP_FINALIZER)
            .await?;
        Ok(true)
    }

    async fn cleanup_addons(&self, cluster: &Cluster, namespace: &str) -> Result<bool, DeletionError> {
        let addons: Vec<Addon> = self
            .seed
            .list(&ListOptions::namespaced(namespace))
            .await
            .context(format!("failed to list addons in {namespace}"))?;
        if addons.is_empty() {
            return Ok(true);
        }

        for addon in addons.iter().filter(|addon| !is_deleting(*addon)) {
            ignore_not_found(self.seed.delete(addon, None).await)
                .context(format!("failed to delete addon {}", addon.name_any()))?;
        }

        self.recorder
            .normal(
                cluster,
                "AddonCleanup",
                format!("{} Addons waiting for deletion", addons.len()),
            )
            .await;
        Ok(false)
    }
}
