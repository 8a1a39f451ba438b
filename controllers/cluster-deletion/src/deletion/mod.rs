//! Cluster teardown
//!
//! A cluster is torn down by a fixed sequence of stages. Each stage owns one
//! finalizer on the Cluster and removes it once its work is confirmed done.
//! Stages report whether they are finished; the first unfinished stage ends
//! the run, and the next reconcile picks up where this one stopped. Nothing
//! is remembered between runs except what is stored on the Cluster itself.
//!
//! Stage order:
//! 1. OPA constraints in the cluster namespace
//! 2. LoadBalancers and volumes inside the user cluster
//! 3. EtcdBackupConfigs
//! 4. Nodes and machines
//! 5. Cluster role bindings (legacy)
//! 6. Service accounts in the seed
//! 7. Cluster namespace, after its addons are gone
//! 8. Cloud credentials secret

mod cluster_role_bindings;
mod constraints;
mod credentials;
mod etcd_backup_configs;
mod in_cluster;
mod load_balancers;
mod namespace;
mod nodes;
mod service_accounts;
mod volumes;

#[cfg(test)]
pub(crate) mod fixtures;


#[cfg(test)]
#[path = "load_balancers_test.rs"]
mod load_balancers_test;


use crate::error::DeletionError;
use crate::metrics::DeletionMetrics;
use crate::user_cluster::UserClusterClientProvider;
use crds::{
    Cluster, CREDENTIALS_SECRETS_CLEANUP_FINALIZER, NAMESPACE_CLEANUP_FINALIZER,
    NODE_DELETION_FINALIZER,
};
use kube::ResourceExt;
use kubernetes_helper::{
    has_finalizer, has_finalizer_superset, try_remove_finalizer, Clock, EventRecorder,
};
use resource_client::KubeClientTrait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Client for the user cluster, connected on first use.
///
/// The late stages run after the user cluster control plane is gone, so the
/// connection must not be made unless a stage actually needs it.
pub(crate) struct LazyUserClient<'a, P: UserClusterClientProvider> {
    provider: &'a P,
    client: OnceCell<Arc<P::Client>>,
}

impl<'a, P: UserClusterClientProvider> LazyUserClient<'a, P> {
    fn new(provider: &'a P) -> Self {
        Self {
            provider,
            client: OnceCell::new(),
        }
    }

    pub(crate) async fn get(&self, cluster: &Cluster) -> Result<&P::Client, DeletionError> {
        let client = self
            .client
            .get_or_try_init(|| self.provider.client(cluster))
            .await?;
        Ok(client.as_ref())
    }
}

/// Tears down user clusters.
pub struct Deletion<S, P> {
    seed: Arc<S>,
    user_clusters: Arc<P>,
    recorder: EventRecorder,
    clock: Arc<dyn Clock>,
    metrics: DeletionMetrics,
    kubermatic_namespace: String,
}

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    pub fn new(
        seed: Arc<S>,
        user_clusters: Arc<P>,
        recorder: EventRecorder,
        clock: Arc<dyn Clock>,
        metrics: DeletionMetrics,
        kubermatic_namespace: impl Into<String>,
    ) -> Self {
        Self {
            seed,
            user_clusters,
            recorder,
            clock,
            metrics,
            kubermatic_namespace: kubermatic_namespace.into(),
        }
    }

    /// Runs the cleanup stages in order until one of them is not finished yet.
    ///
    /// `cluster` is kept up to date with every patch made along the way.
    pub async fn cleanup_cluster(&self, cluster: &mut Cluster) -> Result<(), DeletionError> {
        let user = LazyUserClient::new(self.user_clusters.as_ref());

        if !self.cleanup_constraints(cluster).await? {
            return Ok(());
        }
        if !self.cleanup_in_cluster_resources(cluster, &user).await? {
            return Ok(());
        }
        if !self.cleanup_etcd_backup_configs(cluster).await? {
            return Ok(());
        }
        if !self.cleanup_nodes(cluster, &user).await? {
            return Ok(());
        }
        self.cleanup_cluster_role_bindings(cluster).await?;
        if !self.cleanup_service_accounts(cluster).await? {
            return Ok(());
        }

        // Credentials must outlive the machines, deleting those needs the cloud provider.
        if has_finalizer(cluster, &[NODE_DELETION_FINALIZER]) {
            return Ok(());
        }

        // Namespace deletion cascades, so every other stage has to be done first.
        if !has_finalizer_superset(
            cluster,
            &[CREDENTIALS_SECRETS_CLEANUP_FINALIZER, NAMESPACE_CLEANUP_FINALIZER],
        ) {
            debug!(
                "Cluster {} still has pending finalizers {:?}",
                cluster.name_any(),
                cluster.finalizers()
            );
            return Ok(());
        }

        if !self.delete_cluster_namespace(cluster).await? {
            return Ok(());
        }

        self.cleanup_credentials_secret(cluster).await
    }

    async fn remove_finalizer(&self, cluster: &mut Cluster, finalizer: &str) -> Result<(), DeletionError> {
        if !has_finalizer(cluster, &[finalizer]) {
            return Ok(());
        }
        debug!("Removing finalizer {} from cluster {}", finalizer, cluster.name_any());
        try_remove_finalizer(self.seed.as_ref(), cluster, &[finalizer]).await?;
        Ok(())
    }
}
