use super::{Deletion, LazyUserClient};
use crate::error::DeletionError;
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, IN_CLUSTER_LB_CLEANUP_FINALIZER, IN_CLUSTER_PV_CLEANUP_FINALIZER};
use kube::ResourceExt;
use kubernetes_helper::{has_finalizer, try_remove_finalizer};
use resource_client::KubeClientTrait;
use tracing::debug;

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Drains LoadBalancers and volumes of the user cluster. Both run in the
    /// same pass so the cloud provider can release them in parallel.
    pub(super) async fn cleanup_in_cluster_resources(
        &self,
        cluster: &mut Cluster,
        user: &LazyUserClient<'_, P>,
    ) -> Result<bool, DeletionError> {
        let delete_lbs = has_finalizer(cluster, &[IN_CLUSTER_LB_CLEANUP_FINALIZER]);
        let delete_volumes = has_finalizer(cluster, &[IN_CLUSTER_PV_CLEANUP_FINALIZER]);
        if !delete_lbs && !delete_volumes {
            return Ok(true);
        }
        let client = user.get(cluster).await?;

        let mut deleted_something = false;
        if delete_lbs {
            deleted_something |= self.cleanup_lbs(cluster, client).await?;
        }
        if delete_volumes {
            deleted_something |= self.cleanup_volumes(client).await?;
        }

        // Come back later, the next pass sees what is left.
        if deleted_something {
            debug!("In-cluster resources of cluster {} are still being deleted", cluster.name_any());
            return Ok(false);
        }

        if !self.check_if_all_loadbalancers_are_gone(cluster, client).await? {
            return Ok(false);
        }

        try_remove_finalizer(
            self.seed.as_ref(),
            cluster,
            &[IN_CLUSTER_LB_CLEANUP_FINALIZER, IN_CLUSTER_PV_CLEANUP_FINALIZER],
        )
        .await?;
        Ok(true)
    }
}
