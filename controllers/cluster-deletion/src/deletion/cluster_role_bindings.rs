use super::Deletion;
use crate::error::DeletionError;
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, CLUSTER_ROLE_BINDINGS_CLEANUP_FINALIZER};
use resource_client::KubeClientTrait;

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Cluster role bindings are garbage collected through their owner
    /// references now. Only the finalizer of older clusters is left to drop.
    pub(super) async fn cleanup_cluster_role_bindings(
        &self,
        cluster: &mut Cluster,
    ) -> Result<(), DeletionError> {
        self.remove_finalizer(cluster, CLUSTER_ROLE_BINDINGS_CLEANUP_FINALIZER)
            .await
    }
}
