use super::{Deletion, LazyUserClient};
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use crds::{Cluster, Machine, MachineDeployment, MachineSet, NODE_DELETION_FINALIZER, SKIP_EVICTION_ANNOTATION};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use kubernetes_helper::{has_finalizer, is_deleting, try_patch};
use resource_client::{ignore_not_found, KubeClientTrait, KubeObject, ListOptions};
use tracing::{debug, info};

/// Namespace holding the machine objects inside the user cluster.
const MACHINE_NAMESPACE: &str = "kube-system";

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes all machines of the cluster, one level of the
    /// MachineDeployment > MachineSet > Machine hierarchy per pass.
    pub(super) async fn cleanup_nodes(
        &self,
        cluster: &mut Cluster,
        user: &LazyUserClient<'_, P>,
    ) -> Result<bool, DeletionError> {
        if !has_finalizer(cluster, &[NODE_DELETION_FINALIZER]) {
            return Ok(true);
        }
        let client = user.get(cluster).await?;

        disable_eviction(client).await?;

        if self
            .delete_machine_level::<MachineDeployment, _>(cluster, client)
            .await?
        {
            return Ok(false);
        }
        if self.delete_machine_level::<MachineSet, _>(cluster, client).await? {
            return Ok(false);
        }
        if self.delete_machine_level::<Machine, _>(cluster, client).await? {
            return Ok(false);
        }

        self.remove_finalizer(cluster, NODE_DELETION_FINALIZER)
            .await?;
        Ok(true)
    }

    /// Deletes every object of kind `K` in the machine namespace. Returns true
    /// while any of them still exist.
    async fn delete_machine_level<K, U>(&self, cluster: &Cluster, client: &U) -> Result<bool, DeletionError>
    where
        K: KubeObject,
        U: KubeClientTrait + ?Sized,
    {
        let kind = K::kind(&());
        let objects: Vec<K> = client
            .list(&ListOptions::namespaced(MACHINE_NAMESPACE))
            .await
            .context(format!("failed to list {kind}s"))?;
        if objects.is_empty() {
            return Ok(false);
        }

        for object in objects.iter().filter(|object| !is_deleting(*object)) {
            ignore_not_found(client.delete(object, None).await)
                .context(format!("failed to delete {} {}", kind, object.name_any()))?;
        }

        info!(
            "Waiting for {} {}s of cluster {} to be deleted",
            objects.len(),
            kind,
            cluster.name_any()
        );
        self.recorder
            .normal(
                cluster,
                "ClusterCleanup",
                format!("waiting for {} {}s to be deleted", objects.len(), kind),
            )
            .await;
        Ok(true)
    }
}

/// Marks all nodes so the machine controller deletes them without draining.
async fn disable_eviction<U: KubeClientTrait + ?Sized>(client: &U) -> Result<(), DeletionError> {
    let nodes: Vec<Node> = client
        .list(&ListOptions::all())
        .await
        .context("failed to list user cluster nodes")?;

    for mut node in nodes {
        if node.annotations().get(SKIP_EVICTION_ANNOTATION).map(String::as_str) == Some("true") {
            continue;
        }
        debug!("Disabling eviction on node {}", node.name_any());
        let name = node.name_any();
        try_patch(client, &mut node, |n| {
            n.annotations_mut()
                .insert(SKIP_EVICTION_ANNOTATION.to_string(), "true".to_string());
        })
        .await
        .context(format!(
            "failed to add the annotation {SKIP_EVICTION_ANNOTATION}=true to node {name}"
        ))?;
    }
    Ok(())
}
