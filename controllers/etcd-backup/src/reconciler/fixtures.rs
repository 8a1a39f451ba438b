//! Shared setup for the reconciler tests.

use super::certificates::{CLUSTER_CA_CERT_KEY, CLUSTER_CA_KEY_KEY, CLUSTER_CA_SECRET_NAME};
use super::Reconciler;
use crate::config::{
    container_from_yaml, BackupDestination, BackupSettings, DEFAULT_BACKUP_IMAGE,
    DEFAULT_DELETE_CONTAINER, DEFAULT_STORE_CONTAINER,
};
use crate::jobs::JOB_NAMESPACE;
use crate::naming::RandStringGenerator;
use chrono::{DateTime, Duration, Utc};
use crds::{
    BackupStatus, BackupStatusPhase, Cluster, ClusterReference, ClusterSpec, ClusterStatus,
    EtcdBackupConfig, EtcdBackupConfigSpec, DELETE_ALL_BACKUPS_FINALIZER,
};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::{Secret, SecretReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kubernetes_helper::time::from_chrono;
use kubernetes_helper::{Clock, EventRecorder, FakeClock, MockEventPublisher, RecordedEvent};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use resource_client::MockKubeClient;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) const NOW: i64 = 1_700_000_000;
pub(crate) const CLUSTER_NAME: &str = "testcluster";
pub(crate) const CLUSTER_NAMESPACE: &str = "cluster-testcluster";
pub(crate) const CONFIG_NAME: &str = "testbackup";
pub(crate) const BACKUP_JOB_NAME: &str = "testcluster-backup-testbackup-create-xxxx";
pub(crate) const DELETE_JOB_NAME: &str = "testcluster-backup-testbackup-delete-xxxx";
pub(crate) const CA_BUNDLE: &str = "-----BEGIN CERTIFICATE-----\nMIIBtest\n-----END CERTIFICATE-----\n";

/// Self-signed root CA as certificate and key PEM.
pub(crate) fn root_ca(common_name: &str) -> (String, String) {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

pub(crate) struct Fixture {
    pub seed: MockKubeClient,
    pub clock: FakeClock,
    pub events: MockEventPublisher,
    /// Root CA stored by `cluster()`, as certificate and key PEM.
    pub ca: (String, String),
    pub reconciler: Reconciler<MockKubeClient>,
}

pub(crate) fn settings(with_delete_container: bool) -> BackupSettings {
    let destination = |credentials: bool| BackupDestination {
        endpoint: "https://s3.amazonaws.com".to_string(),
        bucket_name: "etcd-backups".to_string(),
        credentials: credentials.then(|| SecretReference {
            name: Some("backup-s3".to_string()),
            namespace: Some("kube-system".to_string()),
        }),
    };
    let delete_container = if with_delete_container {
        container_from_yaml(DEFAULT_DELETE_CONTAINER).unwrap()
    } else {
        None
    };

    BackupSettings {
        backup_image: DEFAULT_BACKUP_IMAGE.to_string(),
        store_container: container_from_yaml(DEFAULT_STORE_CONTAINER).unwrap().unwrap(),
        delete_container,
        destinations: BTreeMap::from([
            ("s3".to_string(), destination(true)),
            ("no-credentials".to_string(), destination(false)),
        ]),
        ca_bundle: CA_BUNDLE.to_string(),
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(settings(true))
    }

    pub fn with_settings(settings: BackupSettings) -> Self {
        let seed = MockKubeClient::new();
        let clock = FakeClock::at_unix(NOW);
        seed.set_now(clock.now());

        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let seed_client = Arc::new(seed.clone());
        let events = MockEventPublisher::new();
        let recorder = EventRecorder::new(Arc::new(events.clone()));
        let rand: RandStringGenerator = Arc::new(|| "xxxx".to_string());
        let reconciler = Reconciler::new(seed_client, recorder, shared_clock, rand, settings);

        Self {
            seed,
            clock,
            events,
            ca: root_ca("root-ca.testcluster"),
            reconciler,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Moves both the reconciler clock and the server clock.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
        self.seed.set_now(self.clock.now());
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.clock.set(now);
        self.seed.set_now(now);
    }

    pub fn cluster(&self) -> Cluster {
        let mut cluster = Cluster::new(CLUSTER_NAME, ClusterSpec::default());
        cluster.metadata.uid = Some("7d9c0a4e".to_string());
        cluster.status = Some(ClusterStatus {
            namespace_name: CLUSTER_NAMESPACE.to_string(),
        });
        let (cert, key) = &self.ca;
        self.ca_secret(cert, key);
        self.seed.add(cluster)
    }

    /// Stores the cluster root CA secret in the cluster namespace.
    pub fn ca_secret(&self, cert: &str, key: &str) -> Secret {
        self.seed.add(Secret {
            metadata: ObjectMeta {
                name: Some(CLUSTER_CA_SECRET_NAME.to_string()),
                namespace: Some(CLUSTER_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (CLUSTER_CA_CERT_KEY.to_string(), ByteString(cert.as_bytes().to_vec())),
                (CLUSTER_CA_KEY_KEY.to_string(), ByteString(key.as_bytes().to_vec())),
            ])),
            ..Default::default()
        })
    }

    /// Stores a config created at the current time.
    pub fn config(&self, schedule: &str, keep: Option<i32>, backups: Vec<BackupStatus>) -> EtcdBackupConfig {
        let mut config = EtcdBackupConfig::new(
            CONFIG_NAME,
            EtcdBackupConfigSpec {
                name: CONFIG_NAME.to_string(),
                cluster: ClusterReference {
                    name: CLUSTER_NAME.to_string(),
                    uid: Some("7d9c0a4e".to_string()),
                },
                schedule: schedule.to_string(),
                keep,
                destination: "s3".to_string(),
            },
        );
        config.metadata.namespace = Some(CLUSTER_NAMESPACE.to_string());
        if !backups.is_empty() {
            config.status_mut().current_backups = backups;
        }
        self.seed.add(config)
    }

    /// Marks a stored config as deleted while it still carries the backup finalizer.
    pub fn delete_config(&self, config: EtcdBackupConfig) -> EtcdBackupConfig {
        let mut config = config;
        config.metadata.finalizers = Some(vec![DELETE_ALL_BACKUPS_FINALIZER.to_string()]);
        config.metadata.deletion_timestamp = from_chrono(self.now());
        self.seed.add(config)
    }

    pub fn stored_config(&self) -> Option<EtcdBackupConfig> {
        self.seed.get_object(Some(CLUSTER_NAMESPACE), CONFIG_NAME)
    }

    pub fn stored_backups(&self) -> Vec<BackupStatus> {
        self.stored_config()
            .map(|config| config.current_backups().to_vec())
            .unwrap_or_default()
    }

    /// Stores a job, finished with the given condition type if one is set.
    pub fn job(&self, name: &str, finished: Option<(&str, &str, DateTime<Utc>)>) -> Job {
        let conditions = finished.map(|(condition_type, message, at)| {
            vec![JobCondition {
                type_: condition_type.to_string(),
                status: "True".to_string(),
                message: Some(message.to_string()),
                last_transition_time: from_chrono(at),
                ..Default::default()
            }]
        });
        self.seed.add(Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(JOB_NAMESPACE.to_string()),
                ..Default::default()
            },
            status: Some(JobStatus {
                conditions,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    pub fn job_exists(&self, name: &str) -> bool {
        self.seed.exists::<Job>(Some(JOB_NAMESPACE), name)
    }

    pub fn events(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events.with_reason(reason)
    }
}

/// Backup entry with job names derived from `name`.
pub(crate) fn backup(name: &str) -> BackupStatus {
    BackupStatus {
        backup_name: format!("{name}.db"),
        job_name: format!("{name}-create"),
        delete_job_name: format!("{name}-delete"),
        ..Default::default()
    }
}

pub(crate) fn completed_backup(name: &str, finished: DateTime<Utc>) -> BackupStatus {
    BackupStatus {
        scheduled_time: Some(finished - Duration::minutes(1)),
        backup_start_time: Some(finished - Duration::minutes(1)),
        backup_finished_time: Some(finished),
        backup_phase: Some(BackupStatusPhase::Completed),
        ..backup(name)
    }
}

pub(crate) fn failed_backup(name: &str, finished: DateTime<Utc>) -> BackupStatus {
    BackupStatus {
        backup_phase: Some(BackupStatusPhase::Failed),
        backup_message: "DeadlineExceeded".to_string(),
        ..completed_backup(name, finished)
    }
}

pub(crate) fn deleted_backup(name: &str, finished: DateTime<Utc>) -> BackupStatus {
    BackupStatus {
        delete_start_time: Some(finished - Duration::seconds(30)),
        delete_finished_time: Some(finished),
        delete_phase: Some(BackupStatusPhase::Completed),
        ..completed_backup(name, finished - Duration::minutes(5))
    }
}
