use super::{min_requeue, Reconciler, FAILED_JOB_RETENTION, SUCCEEDED_JOB_RETENTION};
use crate::error::{BackupError, ResultExt};
use chrono::{DateTime, Utc};
use crds::{BackupStatusPhase, EtcdBackupConfig, DELETE_ALL_BACKUPS_FINALIZER};
use kube::ResourceExt;
use kubernetes_helper::try_remove_finalizer;
use resource_client::KubeClientTrait;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of looking at one finished job.
enum Expiry {
    /// The job is gone from the cluster.
    Deleted,
    /// The job must be kept for the given time.
    Retained(Duration),
}

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Deletes backup and delete jobs once their retention passed, and drops
    /// ledger entries whose jobs are both gone.
    pub(super) async fn delete_finished_backup_jobs(
        &self,
        config: &mut EtcdBackupConfig,
    ) -> Result<Option<Duration>, BackupError> {
        let old = config.clone();
        let now = self.clock.now();
        let deleting = config.is_deleting();
        let mut requeue = None;
        let mut modified = false;
        let mut remaining = Vec::with_capacity(config.current_backups().len());

        for backup in config.current_backups() {
            if deleting && backup.backup_phase.is_none() {
                debug!("Dropping unstarted backup {} of deleted config", backup.backup_name);
                modified = true;
                continue;
            }

            let mut backup_job_deleted = false;
            if let Some(finished) = backup.backup_finished_time {
                let retention = if deleting {
                    Duration::ZERO
                } else if backup.backup_phase == Some(BackupStatusPhase::Completed) {
                    SUCCEEDED_JOB_RETENTION
                } else {
                    FAILED_JOB_RETENTION
                };
                match self
                    .expire_job(&backup.backup_name, &backup.job_name, finished, retention, now)
                    .await?
                {
                    Expiry::Deleted => backup_job_deleted = true,
                    Expiry::Retained(left) => requeue = min_requeue(requeue, Some(left)),
                }
            }

            let mut delete_job_deleted = false;
            if let Some(finished) = backup.delete_finished_time {
                let retention = if deleting {
                    Duration::ZERO
                } else {
                    SUCCEEDED_JOB_RETENTION
                };
                match self
                    .expire_job(&backup.backup_name, &backup.delete_job_name, finished, retention, now)
                    .await?
                {
                    Expiry::Deleted => delete_job_deleted = true,
                    Expiry::Retained(left) => requeue = min_requeue(requeue, Some(left)),
                }
            }

            if backup_job_deleted && delete_job_deleted {
                info!("Backup {} fully deleted", backup.backup_name);
                modified = true;
                continue;
            }
            remaining.push(backup.clone());
        }

        if modified {
            config.status_mut().current_backups = remaining;
            self.patch_status(&old, config).await?;
        }
        Ok(requeue)
    }

    async fn expire_job(
        &self,
        backup_name: &str,
        job_name: &str,
        finished: DateTime<Utc>,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<Expiry, BackupError> {
        let age = (now - finished).to_std().unwrap_or_default();
        if age < retention {
            return Ok(Expiry::Retained(retention - age));
        }

        let job = self
            .get_job(job_name)
            .await
            .context(format!("backup {backup_name}: failed to get job {job_name}"))?;
        if let Some(job) = job {
            self.delete_job(&job)
                .await
                .context(format!("backup {backup_name}: failed to delete job {job_name}"))?;
            debug!("Deleted job {} of backup {}", job_name, backup_name);
        }
        Ok(Expiry::Deleted)
    }

    /// Releases a deleted config once no backups are tracked anymore.
    pub(super) async fn handle_finalization(
        &self,
        config: &mut EtcdBackupConfig,
    ) -> Result<Option<Duration>, BackupError> {
        if !config.is_deleting() || !config.current_backups().is_empty() {
            return Ok(None);
        }

        try_remove_finalizer(self.client.as_ref(), config, &[DELETE_ALL_BACKUPS_FINALIZER]).await?;
        info!("Released EtcdBackupConfig {}", config.name_any());
        Ok(None)
    }
}
