use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, Constraint, KUBERMATIC_CONSTRAINT_CLEANUP_FINALIZER};
use kube::ResourceExt;
use kubernetes_helper::has_finalizer;
use resource_client::{KubeClientTrait, ListOptions};
use tracing::debug;

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Removes the OPA constraints first so admission policies cannot block
    /// any of the deletions that follow.
    pub(super) async fn cleanup_constraints(&self, cluster: &mut Cluster) -> Result<bool, DeletionError> {
        if !has_finalizer(cluster, &[KUBERMATIC_CONSTRAINT_CLEANUP_FINALIZER]) {
            return Ok(true);
        }

        let namespace = cluster.namespace_name().to_string();
        if !namespace.is_empty() {
            match self
                .seed
                .delete_all_of::<Constraint>(&ListOptions::namespaced(&namespace))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_no_match() || e.is_not_found() => {
                    debug!("No constraints to delete for cluster {}: {}", cluster.name_any(), e);
                }
                Err(e) => {
                    return Err(e).context(format!("failed to delete constraints in {namespace}"));
                }
            }
        }

        self.remove_finalizer(cluster, KUBERMATIC_CONSTRAINT_CLEANUP_FINALIZER)
            .await?;
        Ok(true)
    }
}
