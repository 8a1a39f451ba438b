//! Access to the API server of a user cluster.
//!
//! The control plane of every user cluster runs in its seed namespace, which
//! also holds an admin kubeconfig secret. Clients are built from that secret
//! on demand.

use async_trait::async_trait;
use crds::Cluster;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use resource_client::{KubeClient, KubeClientError, KubeClientTrait};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Secret in the cluster namespace holding the admin kubeconfig.
pub const ADMIN_KUBECONFIG_SECRET_NAME: &str = "admin-kubeconfig";
pub const ADMIN_KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

#[derive(Debug, Error)]
pub enum UserClusterError {
    #[error("cluster {0} has no namespace")]
    NoNamespace(String),

    #[error("failed to read kubeconfig secret: {0}")]
    Secret(#[from] KubeClientError),

    #[error("kubeconfig secret {namespace}/{name} has no {key} entry")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("failed to create client: {0}")]
    Client(#[from] kube::Error),
}

/// Hands out API clients for user clusters.
#[async_trait]
pub trait UserClusterClientProvider: Send + Sync {
    type Client: KubeClientTrait + 'static;

    async fn client(&self, cluster: &Cluster) -> Result<Arc<Self::Client>, UserClusterError>;
}

/// Builds clients from the `admin-kubeconfig` secret of each cluster.
pub struct KubeconfigSecretProvider<S> {
    seed: Arc<S>,
}

impl<S: KubeClientTrait> KubeconfigSecretProvider<S> {
    pub fn new(seed: Arc<S>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl<S: KubeClientTrait + 'static> UserClusterClientProvider for KubeconfigSecretProvider<S> {
    type Client = KubeClient;

    async fn client(&self, cluster: &Cluster) -> Result<Arc<KubeClient>, UserClusterError> {
        let namespace = cluster.namespace_name();
        if namespace.is_empty() {
            return Err(UserClusterError::NoNamespace(cluster.name_any()));
        }

        let secret: Secret = self
            .seed
            .get(Some(namespace), ADMIN_KUBECONFIG_SECRET_NAME)
            .await?;
        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(ADMIN_KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| UserClusterError::MissingKey {
                namespace: namespace.to_string(),
                name: ADMIN_KUBECONFIG_SECRET_NAME.to_string(),
                key: ADMIN_KUBECONFIG_SECRET_KEY.to_string(),
            })?;

        let yaml = String::from_utf8(raw.0.clone())
            .map_err(|e| UserClusterError::Kubeconfig(e.to_string()))?;
        let kubeconfig =
            Kubeconfig::from_yaml(&yaml).map_err(|e| UserClusterError::Kubeconfig(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| UserClusterError::Kubeconfig(e.to_string()))?;

        debug!("Built user cluster client for {}", cluster.name_any());
        Ok(Arc::new(KubeClient::new(Client::try_from(config)?)))
    }
}

/// Provider handing out one fixed client, for tests.
#[cfg(test)]
pub struct FixedProvider<U> {
    client: Arc<U>,
}

#[cfg(test)]
impl<U> FixedProvider<U> {
    pub fn new(client: Arc<U>) -> Self {
        Self { client }
    }
}

#[cfg(test)]
#[async_trait]
impl<U: KubeClientTrait + 'static> UserClusterClientProvider for FixedProvider<U> {
    type Client = U;

    async fn client(&self, _cluster: &Cluster) -> Result<Arc<U>, UserClusterError> {
        Ok(Arc::clone(&self.client))
    }
}
