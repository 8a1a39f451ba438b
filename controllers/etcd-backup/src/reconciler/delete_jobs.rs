use super::{
    min_requeue, true_condition, Reconciler, ASSUMED_JOB_RUNTIME, MAX_SIMULTANEOUS_DELETE_JOBS,
    SUCCEEDED_JOB_RETENTION,
};
use crate::config::BackupDestination;
use crate::error::{BackupError, ResultExt};
use crds::{BackupStatusPhase, Cluster, EtcdBackupConfig};
use kubernetes_helper::time::to_chrono;
use resource_client::{ignore_already_exists, KubeClientTrait};
use std::time::Duration;
use tracing::{debug, info};

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Starts delete jobs for failed backups and for completed backups
    /// beyond the keep count, newest backups being kept first.
    ///
    /// One-shot backups are only deleted together with their config.
    pub(super) async fn start_pending_backup_delete_jobs(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
        destination: &BackupDestination,
    ) -> Result<Option<Duration>, BackupError> {
        if config.spec.schedule.is_empty() && !config.is_deleting() {
            return Ok(None);
        }

        let keep_count = if config.is_deleting() {
            0
        } else {
            config.kept_backups_count()
        };

        let mut kept = 0;
        let mut running = 0;
        let mut to_delete = Vec::new();
        for (index, backup) in config.current_backups().iter().enumerate().rev() {
            if backup.delete_phase == Some(BackupStatusPhase::Running) {
                running += 1;
            }
            match backup.backup_phase {
                Some(BackupStatusPhase::Failed) if backup.delete_phase.is_none() => to_delete.push(index),
                Some(BackupStatusPhase::Completed) => {
                    kept += 1;
                    if kept > keep_count && backup.delete_phase.is_none() {
                        to_delete.push(index);
                    }
                }
                _ => {}
            }
        }

        let old = config.clone();
        let mut modified = false;
        for index in to_delete {
            if running >= MAX_SIMULTANEOUS_DELETE_JOBS {
                debug!("{} delete jobs running, postponing the rest", running);
                break;
            }
            self.create_backup_delete_job(config, cluster, destination, index)
                .await?;
            running += 1;
            modified = true;
        }

        if !modified {
            return Ok(None);
        }
        self.patch_status(&old, config).await?;
        Ok(Some(ASSUMED_JOB_RUNTIME))
    }

    /// Records finished delete jobs. Failed or vanished delete jobs are
    /// started again, since only they can remove a backup from the store.
    pub(super) async fn update_running_backup_delete_jobs(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
        destination: &BackupDestination,
    ) -> Result<Option<Duration>, BackupError> {
        let old = config.clone();
        let mut requeue = None;
        let mut running = 0;
        let mut to_restart = Vec::new();

        for index in 0..config.current_backups().len() {
            let Some(mut backup) = config.current_backups().get(index).cloned() else {
                continue;
            };
            if backup.delete_phase != Some(BackupStatusPhase::Running) {
                continue;
            }

            let job = self
                .get_job(&backup.delete_job_name)
                .await
                .context(format!("error getting delete job for backup {}", backup.backup_name))?;
            let Some(job) = job else {
                to_restart.push((index, "job was deleted, restarted it".to_string()));
                continue;
            };

            if let Some(condition) = true_condition(&job, "Complete") {
                backup.delete_phase = Some(BackupStatusPhase::Completed);
                backup.delete_message = condition.message.clone().unwrap_or_default();
                backup.delete_finished_time = condition.last_transition_time.as_ref().and_then(to_chrono);
                config.status_mut().current_backups[index] = backup;
                requeue = min_requeue(requeue, Some(SUCCEEDED_JOB_RETENTION));
            } else if let Some(condition) = true_condition(&job, "Failed") {
                self.delete_job(&job).await.context(format!(
                    "backup {}: failed to delete failed delete job {}",
                    backup.backup_name, backup.delete_job_name
                ))?;
                let message = condition.message.clone().unwrap_or_default();
                to_restart.push((index, format!("Job failed: {message}. Restarted.")));
            } else {
                running += 1;
                requeue = min_requeue(requeue, Some(ASSUMED_JOB_RUNTIME));
            }
        }

        for (index, message) in to_restart {
            if running >= MAX_SIMULTANEOUS_DELETE_JOBS {
                break;
            }
            self.create_backup_delete_job(config, cluster, destination, index)
                .await?;
            if let Some(backup) = config.status_mut().current_backups.get_mut(index) {
                info!("Restarted delete job for {}: {}", backup.backup_name, message);
                backup.delete_message = message;
            }
            running += 1;
            requeue = min_requeue(requeue, Some(ASSUMED_JOB_RUNTIME));
        }

        self.patch_status(&old, config).await?;
        Ok(requeue)
    }

    /// Starts the delete job of one backup. Without a delete container the
    /// deletion is complete right away.
    async fn create_backup_delete_job(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
        destination: &BackupDestination,
        index: usize,
    ) -> Result<(), BackupError> {
        let Some(mut backup) = config.current_backups().get(index).cloned() else {
            return Ok(());
        };
        let now = self.clock.now();

        match &self.settings.delete_container {
            Some(container) => {
                let job = self
                    .job_builder(config, cluster, destination)
                    .delete_job(&backup, container);
                ignore_already_exists(self.client.create(&job).await).context(format!(
                    "error creating delete job for backup {}",
                    backup.backup_name
                ))?;
                backup.delete_phase = Some(BackupStatusPhase::Running);
                backup.delete_start_time = Some(now);
            }
            None => {
                backup.delete_phase = Some(BackupStatusPhase::Completed);
                backup.delete_finished_time = Some(now);
            }
        }

        config.status_mut().current_backups[index] = backup;
        Ok(())
    }
}
