//! Reconciliation of Cluster deletion.
//!
//! Clusters without a deletion timestamp are left alone. For deleting
//! clusters the cleanup stages run until all finalizers are gone.

use crate::deletion::Deletion;
use crate::error::ControllerError;
use crate::user_cluster::UserClusterClientProvider;
use crds::Cluster;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kubernetes_helper::{is_deleting, EventRecorder};
use resource_client::KubeClientTrait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Recheck interval while finalizers remain.
const CLEANUP_REQUEUE: Duration = Duration::from_secs(10);
/// Backoff after an optimistic-lock collision.
const CONFLICT_REQUEUE: Duration = Duration::from_secs(30);

/// Reconciles deleting clusters.
pub struct Reconciler<S, P> {
    deletion: Deletion<S, P>,
    recorder: EventRecorder,
}

impl<S, P> Reconciler<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Creates a new reconciler instance.
    pub fn new(deletion: Deletion<S, P>, recorder: EventRecorder) -> Self {
        Self { deletion, recorder }
    }

    /// Reconciles a Cluster resource.
    ///
    /// Conflicts are expected while several controllers update the same
    /// cluster; they only delay the next attempt. Every other failure is
    /// reported as a `ReconcilingError` event on the cluster.
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<Action, ControllerError> {
        let name = cluster.name_any();

        if !is_deleting(cluster) {
            return Ok(Action::await_change());
        }
        if cluster.spec.pause {
            debug!("Skipping paused cluster {}", name);
            return Ok(Action::await_change());
        }

        info!("Cleaning up cluster {}", name);
        let mut cluster = cluster.clone();
        match self.deletion.cleanup_cluster(&mut cluster).await {
            Ok(()) if cluster.finalizers().is_empty() => {
                info!("Cluster {} is cleaned up", name);
                Ok(Action::await_change())
            }
            Ok(()) => {
                debug!(
                    "Cluster {} still has finalizers {:?}",
                    name,
                    cluster.finalizers()
                );
                Ok(Action::requeue(CLEANUP_REQUEUE))
            }
            Err(e) if e.is_conflict() => {
                debug!("Conflict while cleaning up cluster {}: {}", name, e);
                Ok(Action::requeue(CONFLICT_REQUEUE))
            }
            Err(e) => {
                warn!("Failed to clean up cluster {}: {}", name, e);
                self.recorder
                    .warning(&cluster, "ReconcilingError", e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }
}
