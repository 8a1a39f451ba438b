//! LoadBalancer drain tracking
//!
//! In-tree cloud providers release the cloud load balancer only after the
//! Service object is gone, and they report it solely through a
//! `DeletedLoadBalancer` event. The UIDs of deleted services are kept in an
//! annotation on the Cluster until that event shows up.

use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use chrono::Duration as ChronoDuration;
use crds::{Cluster, CLEANED_UP_LOADBALANCERS_ANNOTATION};
use k8s_openapi::api::core::v1::{Event, Service};
use kube::ResourceExt;
use kubernetes_helper::time::deletion_timestamp;
use kubernetes_helper::{is_deleting, try_patch};
use resource_client::{ignore_not_found, KubeClientTrait, ListOptions};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, warn};

const DELETED_LOAD_BALANCER_REASON: &str = "DeletedLoadBalancer";
const LOAD_BALANCER_SERVICE_TYPE: &str = "LoadBalancer";

/// Events are not guaranteed to arrive. Give up waiting after this many hours.
const LOAD_BALANCER_CLEANUP_DEADLINE_HOURS: i64 = 2;

const ANNOTATION_POLL_INTERVAL: Duration = Duration::from_millis(10);
const ANNOTATION_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// UIDs recorded in the cleaned-up-loadbalancers annotation.
pub(crate) fn tracked_load_balancers(cluster: &Cluster) -> BTreeSet<String> {
    cluster
        .annotations()
        .get(CLEANED_UP_LOADBALANCERS_ANNOTATION)
        .map(|value| {
            value
                .split(',')
                .filter(|uid| !uid.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn set_tracked_load_balancers(cluster: &mut Cluster, uids: &BTreeSet<String>) {
    if uids.is_empty() {
        cluster
            .annotations_mut()
            .remove(CLEANED_UP_LOADBALANCERS_ANNOTATION);
    } else {
        let joined = uids.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        cluster
            .annotations_mut()
            .insert(CLEANED_UP_LOADBALANCERS_ANNOTATION.to_string(), joined);
    }
}

fn is_load_balancer(service: &Service) -> bool {
    service.spec.as_ref().and_then(|spec| spec.type_.as_deref()) == Some(LOAD_BALANCER_SERVICE_TYPE)
}

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes all LoadBalancer services of the user cluster and records their
    /// UIDs on the Cluster. Returns true if anything was deleted or recorded.
    ///
    /// Services kept around by the cloud provider's cleanup finalizer are
    /// recorded too when their UID is missing from the annotation, so a failed
    /// patch after the delete does not lose track of them.
    pub(super) async fn cleanup_lbs<U>(&self, cluster: &mut Cluster, client: &U) -> Result<bool, DeletionError>
    where
        U: KubeClientTrait + ?Sized,
    {
        let services: Vec<Service> = client
            .list(&ListOptions::all())
            .await
            .context("failed to list services from user cluster")?;

        let mut deleted = false;
        for service in services.iter().filter(|service| is_load_balancer(service)) {
            let name = format!("{}/{}", service.namespace().unwrap_or_default(), service.name_any());
            let uid = service.uid();

            if is_deleting(service) {
                let Some(uid) = uid else {
                    continue;
                };
                if tracked_load_balancers(cluster).contains(&uid) {
                    continue;
                }
                info!("Tracking deleting LoadBalancer {} ({}) of cluster {}", name, uid, cluster.name_any());
                self.track_load_balancer(cluster, &uid).await?;
                deleted = true;
                continue;
            }

            ignore_not_found(client.delete(service, None).await)
                .context(format!("failed to delete service {name} from user cluster"))?;
            deleted = true;

            let Some(uid) = uid else {
                continue;
            };
            info!("Deleted LoadBalancer {} ({}) of cluster {}", name, uid, cluster.name_any());
            self.track_load_balancer(cluster, &uid).await?;
        }

        Ok(deleted)
    }

    /// Adds `uid` to the annotation and waits until a fresh read shows it.
    async fn track_load_balancer(&self, cluster: &mut Cluster, uid: &str) -> Result<(), DeletionError> {
        try_patch(self.seed.as_ref(), cluster, |c| {
            let mut uids = tracked_load_balancers(c);
            uids.insert(uid.to_string());
            set_tracked_load_balancers(c, &uids);
        })
        .await
        .context("failed to record deleted LoadBalancer on cluster")?;

        self.wait_for_tracked_load_balancer(cluster, uid).await
    }

    /// Polls until the recorded UID is visible on a fresh read of the cluster.
    async fn wait_for_tracked_load_balancer(&self, cluster: &mut Cluster, uid: &str) -> Result<(), DeletionError> {
        let name = cluster.name_any();
        let poll = async {
            loop {
                let latest: Cluster = self
                    .seed
                    .get(None, &name)
                    .await
                    .context(format!("failed to get cluster {name}"))?;
                if tracked_load_balancers(&latest).contains(uid) {
                    return Ok::<_, DeletionError>(latest);
                }
                tokio::time::sleep(ANNOTATION_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(ANNOTATION_POLL_TIMEOUT, poll).await {
            Ok(latest) => {
                *cluster = latest?;
                Ok(())
            }
            Err(_) => Err(DeletionError::Timeout(format!(
                "LoadBalancer {uid} to appear in annotation {CLEANED_UP_LOADBALANCERS_ANNOTATION}"
            ))),
        }
    }

    /// Checks the cloud provider confirmed the removal of every tracked
    /// LoadBalancer, dropping confirmed ones from the annotation.
    pub(crate) async fn check_if_all_loadbalancers_are_gone<U>(
        &self,
        cluster: &mut Cluster,
        client: &U,
    ) -> Result<bool, DeletionError>
    where
        U: KubeClientTrait + ?Sized,
    {
        if !cluster.requires_lb_deletion_confirmation() {
            return Ok(true);
        }

        let mut remaining = tracked_load_balancers(cluster);
        if remaining.is_empty() {
            return Ok(true);
        }

        for uid in remaining.clone() {
            let events: Vec<Event> = client
                .list(&ListOptions::all().fields(format!("involvedObject.uid={uid}")))
                .await
                .context("failed to get service events")?;
            if events
                .iter()
                .any(|event| event.reason.as_deref() == Some(DELETED_LOAD_BALANCER_REASON))
            {
                remaining.remove(&uid);
            }
        }

        try_patch(self.seed.as_ref(), cluster, |c| {
            set_tracked_load_balancers(c, &remaining);
        })
        .await
        .context("failed to update cluster")?;

        if remaining.is_empty() {
            return Ok(true);
        }

        if let Some(deleted_at) = deletion_timestamp(cluster) {
            if deleted_at + ChronoDuration::hours(LOAD_BALANCER_CLEANUP_DEADLINE_HOURS) < self.clock.now() {
                warn!(
                    "Giving up waiting for {} LoadBalancers of cluster {} to be released",
                    remaining.len(),
                    cluster.name_any()
                );
                self.metrics
                    .set_stale_lbs(&cluster.name_any(), remaining.len());
                return Ok(true);
            }
        }

        Ok(false)
    }
}
