use super::{min_requeue, true_condition, Reconciler, ASSUMED_JOB_RUNTIME};
use crate::config::BackupDestination;
use crate::error::{BackupError, ResultExt};
use crds::{BackupStatusPhase, Cluster, EtcdBackupConfig, DELETE_ALL_BACKUPS_FINALIZER};
use kubernetes_helper::add_finalizer;
use kubernetes_helper::time::to_chrono;
use resource_client::{ignore_already_exists, KubeClientTrait};
use std::time::Duration;
use tracing::{debug, info};

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Creates the jobs of backups that are due and records the outcome of
    /// jobs that were running.
    pub(super) async fn start_pending_backup_jobs(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
        destination: &BackupDestination,
    ) -> Result<Option<Duration>, BackupError> {
        let old = config.clone();
        let now = self.clock.now();
        let mut requeue = None;

        for index in 0..config.current_backups().len() {
            let Some(mut backup) = config.current_backups().get(index).cloned() else {
                continue;
            };

            match backup.backup_phase {
                Some(BackupStatusPhase::Completed | BackupStatusPhase::Failed) => continue,
                Some(BackupStatusPhase::Running) => {
                    let job = self
                        .get_job(&backup.job_name)
                        .await
                        .context(format!("error getting job for backup {}", backup.backup_name))?;

                    let Some(job) = job else {
                        backup.backup_phase = Some(BackupStatusPhase::Failed);
                        backup.backup_message = "backup job deleted externally".to_string();
                        backup.backup_finished_time = Some(now);
                        config.status_mut().current_backups[index] = backup;
                        continue;
                    };

                    let finished = true_condition(&job, "Complete")
                        .map(|c| (BackupStatusPhase::Completed, c))
                        .or_else(|| true_condition(&job, "Failed").map(|c| (BackupStatusPhase::Failed, c)));
                    match finished {
                        Some((phase, condition)) => {
                            debug!("Backup {} finished: {:?}", backup.backup_name, phase);
                            backup.backup_phase = Some(phase);
                            backup.backup_message = condition.message.clone().unwrap_or_default();
                            backup.backup_finished_time =
                                condition.last_transition_time.as_ref().and_then(to_chrono);
                        }
                        None => requeue = min_requeue(requeue, Some(ASSUMED_JOB_RUNTIME)),
                    }
                }
                None => {
                    let due = backup.scheduled_time.is_none_or(|scheduled| scheduled <= now);
                    if !due || config.is_deleting() {
                        continue;
                    }

                    let job = self
                        .job_builder(config, cluster, destination)
                        .backup_job(&backup, &self.settings.store_container);
                    ignore_already_exists(self.client.create(&job).await)
                        .context(format!("error creating job for backup {}", backup.backup_name))?;
                    info!("Started backup job {} for {}", backup.job_name, backup.backup_name);

                    backup.backup_phase = Some(BackupStatusPhase::Running);
                    backup.backup_start_time = Some(now);
                    add_finalizer(config, &[DELETE_ALL_BACKUPS_FINALIZER]);
                    requeue = min_requeue(requeue, Some(ASSUMED_JOB_RUNTIME));
                }
            }

            config.status_mut().current_backups[index] = backup;
        }

        self.update(&old, config).await?;
        Ok(requeue)
    }
}
