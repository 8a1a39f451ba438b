use super::Reconciler;
use crate::error::BackupError;
use crate::naming::{backup_job_name, delete_job_name, one_shot_backup_name, scheduled_backup_name};
use crate::schedule::Schedule;
use chrono::{DateTime, Utc};
use crds::{
    BackupStatus, Cluster, ConditionStatus, EtcdBackupConfig, EtcdBackupConfigCondition,
    EtcdBackupConfigConditionType,
};
use kube::ResourceExt;
use kubernetes_helper::is_deleting;
use kubernetes_helper::time::creation_timestamp;
use resource_client::KubeClientTrait;
use std::time::Duration;
use tracing::debug;

const TOO_MANY_BACKUPS_MESSAGE: &str = "tracking too many backups; not scheduling new ones";

/// Sets a condition on the config and reports whether it changed. The
/// heartbeat alone never counts as a change.
pub(crate) fn set_condition(
    config: &mut EtcdBackupConfig,
    condition_type: EtcdBackupConfigConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> bool {
    let conditions = &mut config.status_mut().conditions;

    let last_transition_time = match conditions.get(&condition_type) {
        Some(old) if old.status == status && old.reason == reason && old.message == message => {
            return false;
        }
        Some(old) if old.status == status => old.last_transition_time,
        _ => Some(now),
    };

    conditions.insert(
        condition_type,
        EtcdBackupConfigCondition {
            status,
            last_heartbeat_time: Some(now),
            last_transition_time,
            reason: reason.to_string(),
            message: message.to_string(),
        },
    );
    true
}

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Adds the next due backup to the ledger.
    ///
    /// Configs without a schedule get exactly one backup. Scheduled configs
    /// get the latest slot that passed since the last scheduled backup;
    /// older missed slots are skipped.
    pub(super) async fn ensure_pending_backup_is_scheduled(
        &self,
        config: &mut EtcdBackupConfig,
        cluster: &Cluster,
    ) -> Result<Option<Duration>, BackupError> {
        if config.is_deleting() || is_deleting(cluster) {
            return Ok(None);
        }

        let now = self.clock.now();
        let old = config.clone();

        if config.current_backups().len() > 2 * config.kept_backups_count() {
            if set_condition(
                config,
                EtcdBackupConfigConditionType::SchedulingActive,
                ConditionStatus::False,
                "TooManyBackups",
                TOO_MANY_BACKUPS_MESSAGE,
                now,
            ) {
                self.patch_status(&old, config).await?;
                self.recorder
                    .warning(&*config, "TooManyBackups", TOO_MANY_BACKUPS_MESSAGE)
                    .await;
            }
            return Ok(None);
        }

        if set_condition(
            config,
            EtcdBackupConfigConditionType::SchedulingActive,
            ConditionStatus::True,
            "",
            "",
            now,
        ) {
            self.patch_status(&old, config).await?;
            self.recorder
                .normal(
                    &*config,
                    "NormalBackupCount",
                    "backup count low enough; scheduling new backups",
                )
                .await;
        }

        let config_name = config.name_any();
        let (scheduled_time, backup_name, requeue) = if config.spec.schedule.is_empty() {
            if let Some(first) = config.current_backups().first() {
                // already scheduled; wait for it, or leave it to the job steps once due
                let until = first
                    .scheduled_time
                    .and_then(|scheduled| (scheduled - now).to_std().ok());
                return Ok(until);
            }
            (now, one_shot_backup_name(&config_name), Duration::ZERO)
        } else {
            let expression = config.spec.schedule.clone();
            let schedule = Schedule::parse(&expression).map_err(|source| BackupError::Schedule {
                schedule: expression.clone(),
                source,
            })?;

            let base = config
                .current_backups()
                .last()
                .and_then(|latest| latest.scheduled_time)
                .or_else(|| creation_timestamp(&*config))
                .unwrap_or(now);

            let mut next = schedule
                .next_after(base)
                .ok_or_else(|| BackupError::ScheduleExhausted(expression.clone()))?;
            let mut pending = None;
            while now > next {
                pending = Some(next);
                next = schedule
                    .next_after(next)
                    .ok_or_else(|| BackupError::ScheduleExhausted(expression.clone()))?;
            }
            let requeue = (next - now).to_std().unwrap_or_default();

            let Some(pending) = pending else {
                debug!("No backup of {} due before {}", config_name, next);
                return Ok(Some(requeue));
            };
            (pending, scheduled_backup_name(&config_name, pending), requeue)
        };

        let cluster_name = cluster.name_any();
        let backup = BackupStatus {
            scheduled_time: Some(scheduled_time),
            backup_name,
            job_name: backup_job_name(&cluster_name, &config_name, &self.rand),
            delete_job_name: delete_job_name(&cluster_name, &config_name, &self.rand),
            ..Default::default()
        };
        debug!("Scheduling backup {} for {}", backup.backup_name, scheduled_time);

        let old = config.clone();
        config.status_mut().current_backups.push(backup);
        self.update(&old, config).await?;

        Ok(Some(requeue))
    }
}
