//! Volume drain
//!
//! New volumes are blocked with a webhook nothing answers. Pods mounting a
//! claim are deleted before the claims and volumes so CSI node plugins can
//! still unmount them. Other pods are left alone.

use super::Deletion;
use crate::error::{DeletionError, ResultExt};
use crate::user_cluster::UserClusterClientProvider;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use kubernetes_helper::{creation_preventing_webhook, is_deleting, CLUSTER_CLEANUP_WEBHOOK_NAME};
use resource_client::{ignore_already_exists, ignore_not_found, KubeClientTrait, ListOptions};
use tracing::{debug, info};

const VOLUME_RESOURCES: [&str; 2] = ["persistentvolumes", "persistentvolumeclaims"];

fn uses_persistent_volume_claim(pod: &Pod) -> bool {
    pod.spec
        .iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
        .any(|volume| volume.persistent_volume_claim.is_some())
}

/// True if the fields the webhook relies on differ. Server-side defaults on
/// other fields are ignored.
fn webhook_differs(existing: &ValidatingWebhookConfiguration, desired: &ValidatingWebhookConfiguration) -> bool {
    let existing = existing.webhooks.as_deref().unwrap_or_default();
    let desired = desired.webhooks.as_deref().unwrap_or_default();
    existing.len() != desired.len()
        || existing.iter().zip(desired).any(|(e, d)| {
            e.rules != d.rules
                || e.client_config.url != d.client_config.url
                || e.failure_policy != d.failure_policy
        })
}

async fn ensure_creation_preventing_webhook<U>(client: &U) -> Result<(), DeletionError>
where
    U: KubeClientTrait + ?Sized,
{
    let desired = creation_preventing_webhook(CLUSTER_CLEANUP_WEBHOOK_NAME, "", &VOLUME_RESOURCES);
    let existing = ignore_not_found(
        client
            .get::<ValidatingWebhookConfiguration>(None, CLUSTER_CLEANUP_WEBHOOK_NAME)
            .await,
    )
    .context(format!("failed to get webhook configuration {CLUSTER_CLEANUP_WEBHOOK_NAME}"))?;

    match existing {
        None => {
            info!("Creating webhook configuration {}", CLUSTER_CLEANUP_WEBHOOK_NAME);
            ignore_already_exists(client.create(&desired).await)
                .context(format!("failed to create webhook configuration {CLUSTER_CLEANUP_WEBHOOK_NAME}"))?;
        }
        Some(existing) if webhook_differs(&existing, &desired) => {
            debug!("Updating webhook configuration {}", CLUSTER_CLEANUP_WEBHOOK_NAME);
            let mut updated = existing.clone();
            updated.webhooks = desired.webhooks;
            client
                .patch(&existing, &updated)
                .await
                .context(format!("failed to update webhook configuration {CLUSTER_CLEANUP_WEBHOOK_NAME}"))?;
        }
        Some(_) => {}
    }
    Ok(())
}

impl<S, P> Deletion<S, P>
where
    S: KubeClientTrait + 'static,
    P: UserClusterClientProvider,
{
    /// Deletes claim-mounting pods, claims and volumes of the user cluster.
    /// Returns true if anything was deleted.
    pub(crate) async fn cleanup_volumes<U>(&self, client: &U) -> Result<bool, DeletionError>
    where
        U: KubeClientTrait + ?Sized,
    {
        ensure_creation_preventing_webhook(client).await?;

        let claims: Vec<PersistentVolumeClaim> = client
            .list(&ListOptions::all())
            .await
            .context("failed to list PVCs from user cluster")?;
        let volumes: Vec<PersistentVolume> = client
            .list(&ListOptions::all())
            .await
            .context("failed to list PVs from user cluster")?;
        if claims.is_empty() && volumes.is_empty() {
            return Ok(false);
        }

        let pods: Vec<Pod> = client
            .list(&ListOptions::all())
            .await
            .context("failed to list pods from user cluster")?;
        for pod in pods
            .iter()
            .filter(|pod| uses_persistent_volume_claim(pod) && !is_deleting(*pod))
        {
            ignore_not_found(client.delete(pod, None).await).context(format!(
                "failed to delete pod {}/{} from user cluster",
                pod.namespace().unwrap_or_default(),
                pod.name_any()
            ))?;
        }

        for claim in claims.iter().filter(|claim| !is_deleting(*claim)) {
            ignore_not_found(client.delete(claim, None).await).context(format!(
                "failed to delete PVC {}/{} from user cluster",
                claim.namespace().unwrap_or_default(),
                claim.name_any()
            ))?;
        }

        for volume in volumes.iter().filter(|volume| !is_deleting(*volume)) {
            ignore_not_found(client.delete(volume, None).await)
                .context(format!("failed to delete PV {} from user cluster", volume.name_any()))?;
        }

        Ok(true)
    }
}
