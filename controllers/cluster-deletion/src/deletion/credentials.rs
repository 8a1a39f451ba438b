use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, CREDENTIALS_SECRETS_CLEANUP_FINALIZER};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use kubernetes_helper::has_finalizer;
use resource_client::{ignore_not_found, KubeClientTrait};
use tracing::info;

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes the cloud provider credentials. Runs last.
    pub(super) async fn cleanup_credentials_secret(&self, cluster: &mut Cluster) -> Result<(), DeletionError> {
        if !has_finalizer(cluster, &[CREDENTIALS_SECRETS_CLEANUP_FINALIZER]) {
            return Ok(());
        }

        let secret_name = cluster.secret_name();
        if !secret_name.is_empty() {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(secret_name.clone()),
                    namespace: Some(self.kubermatic_namespace.clone()),
                    ..Default::default()
                },
                ..Default::default()
            };
            let deleted = ignore_not_found(self.seed.delete(&secret, None).await)
                .context(format!(
                    "failed to delete credentials secret {}/{}",
                    self.kubermatic_namespace, secret_name
                ))?;
            if deleted.is_some() {
                info!("Deleted credentials secret {} of cluster {}", secret_name, cluster.name_any());
            }
        }

        self.remove_finalizer(cluster, CREDENTIALS_SECRETS_CLEANUP_FINALIZER)
            .await
    }
}
