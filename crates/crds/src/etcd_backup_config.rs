//! EtcdBackupConfig CRD
//!
//! Describes recurring or one-shot etcd backups of a user cluster. The
//! status keeps a ledger of every backup attempt together with the jobs
//! that created and deleted it.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backups still have to be deleted from the backend store.
pub const DELETE_ALL_BACKUPS_FINALIZER: &str = "kubermatic.k8c.io/delete-all-backups";

/// Number of backups kept when `spec.keep` is not set.
pub const DEFAULT_KEPT_BACKUPS_COUNT: i32 = 20;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "EtcdBackupConfig",
    namespaced,
    status = "EtcdBackupConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupConfigSpec {
    /// Human readable name of the backup config
    #[serde(default)]
    pub name: String,

    /// Cluster to back up
    pub cluster: ClusterReference,

    /// Cron expression. Empty means a single backup is taken right away.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,

    /// Number of completed backups to keep around
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<i32>,

    /// Name of the backup destination configured for the seed
    #[serde(default)]
    pub destination: String,
}

/// Reference to the owning Cluster object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupConfigStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub current_backups: Vec<BackupStatus>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<EtcdBackupConfigConditionType, EtcdBackupConfigCondition>,

    #[serde(default)]
    pub cleanup_running: bool,
}

/// One backup attempt. Phases move from unset to `Running` and then to
/// `Completed` or `Failed`, independently for the backup and its deletion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub backup_name: String,
    #[serde(default)]
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_finished_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_phase: Option<BackupStatusPhase>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backup_message: String,
    #[serde(default)]
    pub delete_job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_finished_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_phase: Option<BackupStatusPhase>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub delete_message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum BackupStatusPhase {
    Running,
    Completed,
    Failed,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum EtcdBackupConfigConditionType {
    /// Whether new backups are being scheduled
    SchedulingActive,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdBackupConfigCondition {
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl EtcdBackupConfig {
    /// Number of completed backups to retain.
    pub fn kept_backups_count(&self) -> usize {
        match self.spec.keep {
            None => DEFAULT_KEPT_BACKUPS_COUNT.unsigned_abs() as usize,
            Some(keep) if keep <= 0 => 1,
            Some(keep) => keep.unsigned_abs() as usize,
        }
    }

    /// Tracked backups, empty when there is no status yet.
    pub fn current_backups(&self) -> &[BackupStatus] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.current_backups.as_slice())
    }

    /// Mutable access to the status, creating it on first use.
    pub fn status_mut(&mut self) -> &mut EtcdBackupConfigStatus {
        self.status.get_or_insert_with(EtcdBackupConfigStatus::default)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
