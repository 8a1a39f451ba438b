//! Jobs creating and deleting backups.
//!
//! Backup jobs snapshot etcd in an init container and hand the snapshot to
//! the store container through a shared volume. Delete jobs only run the
//! delete container. All jobs live in `kube-system` and are owned by the
//! Cluster, so they disappear with it.

use crate::config::{BackupDestination, DEFAULT_ETCD_IMAGE_TAG};
use crds::{BackupStatus, Cluster, EtcdBackupConfig};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PodSpec,
    PodTemplateSpec, SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const JOB_NAMESPACE: &str = "kube-system";

pub const APP_LABEL_KEY: &str = "app";
pub const BACKUP_JOB_LABEL: &str = "kubermatic-etcd-backup";
pub const BACKUP_CONFIG_NAME_LABEL_KEY: &str = "backupConfig";

/// Volume the snapshot is written to and read from.
pub const SHARED_VOLUME_NAME: &str = "etcd-backup";
const CA_BUNDLE_VOLUME_NAME: &str = "ca-bundle";
const CA_BUNDLE_MOUNT_PATH: &str = "/etc/ca-bundle/";

/// Keys of the etcd client certificate secret.
pub const CA_CERT_SECRET_KEY: &str = "ca.crt";
pub const CLIENT_CERT_SECRET_KEY: &str = "backup-etcd-client.crt";
pub const CLIENT_KEY_SECRET_KEY: &str = "backup-etcd-client.key";
const ETCD_CLIENT_MOUNT_PATH: &str = "/etc/etcd/client";

/// Key of the CA bundle config map.
pub const CA_BUNDLE_CONFIG_MAP_KEY: &str = "ca-bundle.pem";

const BACKUP_JOB_DEADLINE_SECONDS: i64 = 2 * 60;
const DELETE_JOB_DEADLINE_SECONDS: i64 = 4 * 60;

const ETCD_CLUSTER_SIZE: usize = 3;

pub const CLUSTER_ENV: &str = "CLUSTER";
pub const BACKUP_TO_CREATE_ENV: &str = "BACKUP_TO_CREATE";
pub const BACKUP_TO_DELETE_ENV: &str = "BACKUP_TO_DELETE";
pub const BACKUP_SCHEDULE_ENV: &str = "BACKUP_SCHEDULE";
pub const BACKUP_KEEP_COUNT_ENV: &str = "BACKUP_KEEP_COUNT";
pub const BACKUP_CONFIG_ENV: &str = "BACKUP_CONFIG";
pub const ACCESS_KEY_ID_ENV: &str = "ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_ENV: &str = "SECRET_ACCESS_KEY";
pub const BUCKET_NAME_ENV: &str = "BUCKET_NAME";
pub const ENDPOINT_ENV: &str = "ENDPOINT";
pub const INSECURE_ENV: &str = "INSECURE";

pub fn etcd_client_secret_name(cluster: &Cluster) -> String {
    format!("cluster-{}-etcd-client-certificate", cluster.name_any())
}

pub fn ca_bundle_config_map_name(cluster: &Cluster) -> String {
    format!("cluster-{}-ca-bundle", cluster.name_any())
}

/// Client URLs of the etcd members in the cluster namespace.
pub fn etcd_client_endpoints(namespace: &str) -> Vec<String> {
    (0..ETCD_CLUSTER_SIZE)
        .map(|i| format!("https://etcd-{i}.etcd.{namespace}.svc.cluster.local:2379"))
        .collect()
}

/// Shell script trying each endpoint until one snapshot succeeds.
pub fn snapshot_command(endpoints: &[String]) -> Vec<String> {
    let mut script = String::from(
        r#"backupOrReportFailure() {
  echo "Creating backup"
  if ! eval $@; then
    echo "Backup creation failed"
    return 1
  fi
  echo "Successfully created backup, exiting"
  exit 0
}"#,
    );
    for endpoint in endpoints {
        script.push_str(&format!(
            "\nbackupOrReportFailure etcdctl --endpoints {endpoint} snapshot save /backup/snapshot.db"
        ));
    }
    script.push_str("\necho \"Unable to create backup\"\nexit 1");

    vec!["/bin/sh".to_string(), "-c".to_string(), script]
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: name.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Replaces the variable with the same (case-insensitive) name, or appends it.
fn set_env(vars: &mut Vec<EnvVar>, var: EnvVar) {
    match vars.iter_mut().find(|v| v.name.eq_ignore_ascii_case(&var.name)) {
        Some(existing) => *existing = var,
        None => vars.push(var),
    }
}

fn ca_bundle_mount() -> VolumeMount {
    VolumeMount {
        name: CA_BUNDLE_VOLUME_NAME.to_string(),
        mount_path: CA_BUNDLE_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn ca_bundle_volume(cluster: &Cluster) -> Volume {
    Volume {
        name: CA_BUNDLE_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: ca_bundle_config_map_name(cluster),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the jobs of one backup config.
#[derive(Debug)]
pub struct JobBuilder<'a> {
    pub config: &'a EtcdBackupConfig,
    pub cluster: &'a Cluster,
    pub destination: &'a BackupDestination,
    pub backup_image: &'a str,
}

impl JobBuilder<'_> {
    pub fn backup_job(&self, backup: &BackupStatus, store_container: &Container) -> Job {
        let mut store = self.prepare_container(store_container, BACKUP_TO_CREATE_ENV, backup);

        let mut job = self.job_base(&backup.job_name, BACKUP_JOB_DEADLINE_SECONDS);
        let secret_name = etcd_client_secret_name(self.cluster);
        let endpoints = etcd_client_endpoints(self.cluster.namespace_name());

        let image = if self.backup_image.contains(':') {
            self.backup_image.to_string()
        } else {
            format!("{}:{}", self.backup_image, DEFAULT_ETCD_IMAGE_TAG)
        };

        let backup_creator = Container {
            name: "backup-creator".to_string(),
            image: Some(image),
            env: Some(vec![
                env("ETCDCTL_API", "3"),
                env("ETCDCTL_DIAL_TIMEOUT", "3s"),
                env("ETCDCTL_CACERT", format!("{ETCD_CLIENT_MOUNT_PATH}/{CA_CERT_SECRET_KEY}")),
                env("ETCDCTL_CERT", format!("{ETCD_CLIENT_MOUNT_PATH}/{CLIENT_CERT_SECRET_KEY}")),
                env("ETCDCTL_KEY", format!("{ETCD_CLIENT_MOUNT_PATH}/{CLIENT_KEY_SECRET_KEY}")),
            ]),
            command: Some(snapshot_command(&endpoints)),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: SHARED_VOLUME_NAME.to_string(),
                    mount_path: "/backup".to_string(),
                    ..Default::default()
                },
                VolumeMount {
                    name: secret_name.clone(),
                    mount_path: ETCD_CLIENT_MOUNT_PATH.to_string(),
                    ..Default::default()
                },
                ca_bundle_mount(),
            ]),
            ..Default::default()
        };

        store.volume_mounts.get_or_insert_with(Vec::new).push(ca_bundle_mount());

        if let Some(pod) = job.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.init_containers = Some(vec![backup_creator]);
            pod.containers = vec![store];
            pod.volumes = Some(vec![
                Volume {
                    name: SHARED_VOLUME_NAME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: secret_name.clone(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(secret_name),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ca_bundle_volume(self.cluster),
            ]);
        }
        job
    }

    pub fn delete_job(&self, backup: &BackupStatus, delete_container: &Container) -> Job {
        let mut delete = self.prepare_container(delete_container, BACKUP_TO_DELETE_ENV, backup);
        delete.volume_mounts.get_or_insert_with(Vec::new).push(ca_bundle_mount());

        let mut job = self.job_base(&backup.delete_job_name, DELETE_JOB_DEADLINE_SECONDS);
        if let Some(pod) = job.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.containers = vec![delete];
            pod.volumes = Some(vec![ca_bundle_volume(self.cluster)]);
        }
        job
    }

    /// Copies the template and adds the destination and backup variables.
    fn prepare_container(&self, template: &Container, backup_env: &str, backup: &BackupStatus) -> Container {
        let mut container = template.clone();
        let vars = container.env.get_or_insert_with(Vec::new);

        if let Some(secret) = self.destination.credentials.as_ref().and_then(|c| c.name.as_deref()) {
            set_env(vars, secret_env(ACCESS_KEY_ID_ENV, secret));
            set_env(vars, secret_env(SECRET_ACCESS_KEY_ENV, secret));
        }
        set_env(vars, env(BUCKET_NAME_ENV, &self.destination.bucket_name));
        set_env(vars, env(ENDPOINT_ENV, &self.destination.endpoint));
        set_env(vars, env(INSECURE_ENV, self.destination.is_insecure().to_string()));

        vars.extend([
            env(CLUSTER_ENV, self.cluster.name_any()),
            env(backup_env, &backup.backup_name),
            env(BACKUP_SCHEDULE_ENV, &self.config.spec.schedule),
            env(BACKUP_KEEP_COUNT_ENV, self.config.kept_backups_count().to_string()),
            env(BACKUP_CONFIG_ENV, self.config.name_any()),
        ]);
        container
    }

    fn job_base(&self, name: &str, deadline_seconds: i64) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(JOB_NAMESPACE.to_string()),
                labels: Some(BTreeMap::from([
                    (APP_LABEL_KEY.to_string(), BACKUP_JOB_LABEL.to_string()),
                    (BACKUP_CONFIG_NAME_LABEL_KEY.to_string(), self.config.name_any()),
                ])),
                owner_references: self.cluster.controller_owner_ref(&()).map(|owner| vec![owner]),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(3),
                completions: Some(1),
                parallelism: Some(1),
                active_deadline_seconds: Some(deadline_seconds),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        restart_policy: Some("OnFailure".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[path = "jobs_test.rs"]
mod jobs_test;
