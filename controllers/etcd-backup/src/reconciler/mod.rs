//! Reconciliation of EtcdBackupConfigs.
//!
//! Every config keeps a ledger of backups in its status. A reconcile first
//! makes sure the etcd client certificate and the CA bundle the jobs mount
//! are in place, then walks that ledger through six steps:
//! 1. schedule the next due backup
//! 2. start backup jobs that are due and track running ones
//! 3. start delete jobs for backups beyond the keep count
//! 4. track running delete jobs, restarting failed ones
//! 5. garbage-collect finished jobs and drop fully deleted entries
//! 6. release the config once its ledger is empty
//!
//! Each step may ask to be called again after some time; the reconcile
//! requeues after the shortest of those delays.

mod backup_jobs;
mod certificates;
mod cleanup;
mod delete_jobs;
mod scheduling;

#[cfg(test)]
pub(crate) mod fixtures;




#[cfg(test)]
#[path = "certificates_test.rs"]
mod certificates_test;


use crate::config::{BackupDestination, BackupSettings};
use crate::error::{BackupError, ControllerError, ResultExt, StepExt};
use crate::jobs::{JobBuilder, JOB_NAMESPACE};
use crate::naming::RandStringGenerator;
use crds::{Cluster, EtcdBackupConfig};
use k8s_openapi::api::batch::v1::{Job, JobCondition};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kubernetes_helper::{find_condition, Clock, EventRecorder};
use resource_client::{ignore_not_found, DeletePropagation, KubeClientError, KubeClientTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long a backup or delete job is expected to run.
pub(crate) const ASSUMED_JOB_RUNTIME: Duration = Duration::from_secs(50);
pub(crate) const SUCCEEDED_JOB_RETENTION: Duration = Duration::from_secs(60);
pub(crate) const FAILED_JOB_RETENTION: Duration = Duration::from_secs(10 * 60);
pub(crate) const MAX_SIMULTANEOUS_DELETE_JOBS: usize = 3;

/// Backoff after an optimistic-lock collision.
const CONFLICT_REQUEUE: Duration = Duration::from_secs(30);

/// Earlier of two optional requeue delays.
pub(crate) fn min_requeue(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Condition of `job` with the given type and status `True`.
pub(crate) fn true_condition<'a>(job: &'a Job, condition_type: &str) -> Option<&'a JobCondition> {
    let conditions = job.status.as_ref()?.conditions.as_deref()?;
    find_condition(conditions, condition_type, "True")
}

/// Reconciles EtcdBackupConfigs.
pub struct Reconciler<C> {
    client: Arc<C>,
    recorder: EventRecorder,
    clock: Arc<dyn Clock>,
    rand: RandStringGenerator,
    settings: BackupSettings,
}

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Creates a new reconciler instance.
    pub fn new(
        client: Arc<C>,
        recorder: EventRecorder,
        clock: Arc<dyn Clock>,
        rand: RandStringGenerator,
        settings: BackupSettings,
    ) -> Self {
        Self {
            client,
            recorder,
            clock,
            rand,
            settings,
        }
    }

    /// Reconciles an EtcdBackupConfig resource.
    ///
    /// The config is read fresh from the API, the cached copy only names it.
    /// Conflicts only delay the next attempt; every other failure is reported
    /// on both the config and its cluster.
    pub async fn reconcile_backup_config(&self, config: &EtcdBackupConfig) -> Result<Action, ControllerError> {
        let name = config.name_any();
        let namespace = config.namespace();

        let Some(mut config) = ignore_not_found(
            self.client
                .get::<EtcdBackupConfig>(namespace.as_deref(), &name)
                .await,
        )?
        else {
            debug!("EtcdBackupConfig {} is gone", name);
            return Ok(Action::await_change());
        };

        let cluster: Cluster = self.client.get(None, &config.spec.cluster.name).await?;
        if cluster.namespace_name().is_empty() {
            debug!("Cluster {} has no namespace name yet, skipping", cluster.name_any());
            return Ok(Action::await_change());
        }
        if cluster.spec.pause {
            debug!("Skipping EtcdBackupConfig {} of paused cluster {}", name, cluster.name_any());
            return Ok(Action::await_change());
        }

        match self.reconcile(&mut config, &cluster).await {
            Ok(Some(after)) => Ok(Action::requeue(after)),
            Ok(None) => Ok(Action::await_change()),
            Err(e) if e.is_conflict() => {
                debug!("Benign update conflict on EtcdBackupConfig {}; will retry: {}", name, e);
                Ok(Action::requeue(CONFLICT_REQUEUE))
            }
            Err(e) => {
                error!("Reconciling EtcdBackupConfig {} failed: {}", name, e);
                self.recorder
                    .warning(&config, "ReconcilingError", e.to_string())
                    .await;
                self.recorder
                    .warning(
                        &cluster,
                        "ReconcilingError",
                        format!("failed to reconcile etcd backup config {name:?}: {e}"),
                    )
                    .await;
                Err(e.into())
            }
        }
    }

    async fn reconcile(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
    ) -> Result<Option<Duration>, BackupError> {
        let destination_name = config.spec.destination.clone();
        let destination = self
            .settings
            .destination(&destination_name)
            .ok_or_else(|| BackupError::UnknownDestination(destination_name.clone()))?;
        if destination.credentials.is_none() {
            return Err(BackupError::MissingCredentials(destination_name));
        }

        self.ensure_secrets(cluster)
            .await
            .step("create backup secrets")?;
        self.ensure_config_maps(cluster)
            .await
            .step("create backup configmaps")?;

        let mut requeue = self
            .ensure_pending_backup_is_scheduled(config, cluster)
            .await
            .step("ensure next backup is scheduled")?;

        let next = self
            .start_pending_backup_jobs(config, cluster, destination)
            .await
            .step("start pending and update running backups")?;
        requeue = min_requeue(requeue, next);

        let next = self
            .start_pending_backup_delete_jobs(config, cluster, destination)
            .await
            .step("start pending backup delete jobs")?;
        requeue = min_requeue(requeue, next);

        let next = self
            .update_running_backup_delete_jobs(config, cluster, destination)
            .await
            .step("update running backup delete jobs")?;
        requeue = min_requeue(requeue, next);

        let next = self
            .delete_finished_backup_jobs(config)
            .await
            .step("delete finished backup jobs")?;
        requeue = min_requeue(requeue, next);

        let next = self
            .handle_finalization(config)
            .await
            .step("clean up EtcdBackupConfig")?;
        requeue = min_requeue(requeue, next);

        if let Some(after) = requeue {
            info!("EtcdBackupConfig {} reconciled, next check in {:?}", config.name_any(), after);
        }
        Ok(requeue)
    }

    fn job_builder<'a>(
        &'a self,
        config: &'a EtcdBackupConfig,
        cluster: &'a Cluster,
        destination: &'a BackupDestination,
    ) -> JobBuilder<'a> {
        JobBuilder {
            config,
            cluster,
            destination,
            backup_image: &self.settings.backup_image,
        }
    }

    async fn get_job(&self, name: &str) -> Result<Option<Job>, KubeClientError> {
        ignore_not_found(self.client.get(Some(JOB_NAMESPACE), name).await)
    }

    async fn delete_job(&self, job: &Job) -> Result<(), KubeClientError> {
        ignore_not_found(
            self.client
                .delete(job, Some(DeletePropagation::Background))
                .await,
        )?;
        Ok(())
    }

    /// Persists the status of `config`, which must have been derived from `old`.
    async fn patch_status(&self, old: &EtcdBackupConfig, config: &mut EtcdBackupConfig) -> Result<(), BackupError> {
        *config = self
            .client
            .patch_status(old, config)
            .await
            .context("failed to update backup status")?;
        Ok(())
    }

    /// Persists metadata changes such as finalizers, then the status.
    async fn update(&self, old: &EtcdBackupConfig, config: &mut EtcdBackupConfig) -> Result<(), BackupError> {
        let mut stored = self
            .client
            .patch(old, config)
            .await
            .context("failed to update backup config")?;
        // the main resource endpoint leaves the status alone
        stored.status.clone_from(&old.status);

        let mut desired = stored.clone();
        desired.status.clone_from(&config.status);
        self.patch_status(&stored, &mut desired).await?;
        *config = desired;
        Ok(())
    }
}
