//! Controller-specific error types.
//!
//! `DeletionError` covers failures of the cleanup stages, `ControllerError`
//! everything the binary itself can run into.

use crate::user_cluster::UserClusterError;
use kube::Error as KubeError;
use kubernetes_helper::HelperError;
use resource_client::KubeClientError;
use thiserror::Error;

/// Errors raised while tearing down a cluster.
#[derive(Debug, Error)]
pub enum DeletionError {
    /// Kubernetes API call failed
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: KubeClientError,
    },

    /// Finalizer update failed
    #[error(transparent)]
    Helper(#[from] HelperError),

    /// No client for the user cluster could be built
    #[error("failed to get user cluster client: {0}")]
    UserCluster(#[from] UserClusterError),

    /// A write did not become visible in time
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl DeletionError {
    /// True for optimistic-lock collisions, which are retried silently.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Client { source, .. } => source.is_conflict(),
            Self::Helper(e) => e.is_conflict(),
            Self::UserCluster(_) | Self::Timeout(_) => false,
        }
    }
}

/// Attaches a description of the failed operation to client errors.
pub(crate) trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, DeletionError>;
}

impl<T> ResultExt<T> for Result<T, KubeClientError> {
    fn context(self, context: impl Into<String>) -> Result<T, DeletionError> {
        self.map_err(|source| DeletionError::Client {
            context: context.into(),
            source,
        })
    }
}

/// Errors that can occur in the Cluster Deletion Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Client(#[from] KubeClientError),

    /// Cleanup failed
    #[error("Cluster deletion failed: {0}")]
    Deletion(#[from] DeletionError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics endpoint failed
    #[error("Metrics server error: {0}")]
    Metrics(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
