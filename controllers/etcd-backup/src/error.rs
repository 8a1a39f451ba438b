//! Controller-specific error types.

use crate::config::ConfigError;
use crate::schedule::ScheduleError;
use kube::Error as KubeError;
use kubernetes_helper::HelperError;
use resource_client::KubeClientError;
use thiserror::Error;

/// Errors raised while reconciling an EtcdBackupConfig.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Kubernetes API call failed
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: KubeClientError,
    },

    /// Finalizer update failed
    #[error(transparent)]
    Helper(#[from] HelperError),

    #[error("cannot find backup destination {0:?}")]
    UnknownDestination(String),

    #[error("credentials not set for backup destination {0:?}")]
    MissingCredentials(String),

    #[error("failed to parse schedule {schedule:?}: {source}")]
    Schedule {
        schedule: String,
        #[source]
        source: ScheduleError,
    },

    #[error("cluster CA secret {secret:?} is missing {key:?}")]
    MissingCaKey { secret: String, key: &'static str },

    #[error("failed to issue etcd client certificate: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("schedule {0:?} has no upcoming activation")]
    ScheduleExhausted(String),

    /// One of the reconcile steps failed
    #[error("failed to {step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<BackupError>,
    },
}

impl BackupError {
    /// True for optimistic-lock collisions, which are retried silently.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Client { source, .. } => source.is_conflict(),
            Self::Helper(e) => e.is_conflict(),
            Self::Step { source, .. } => source.is_conflict(),
            Self::UnknownDestination(_)
            | Self::MissingCredentials(_)
            | Self::MissingCaKey { .. }
            | Self::Certificate(_)
            | Self::Schedule { .. }
            | Self::ScheduleExhausted(_) => false,
        }
    }
}

/// Attaches a description of the failed operation to client errors.
pub(crate) trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, BackupError>;
}

impl<T> ResultExt<T> for Result<T, KubeClientError> {
    fn context(self, context: impl Into<String>) -> Result<T, BackupError> {
        self.map_err(|source| BackupError::Client {
            context: context.into(),
            source,
        })
    }
}

/// Names the reconcile step an error came from.
pub(crate) trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, BackupError>;
}

impl<T> StepExt<T> for Result<T, BackupError> {
    fn step(self, step: &'static str) -> Result<T, BackupError> {
        self.map_err(|source| BackupError::Step {
            step,
            source: Box::new(source),
        })
    }
}

/// Errors that can occur in the Etcd Backup Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Client(#[from] KubeClientError),

    /// Backup reconciliation failed
    #[error("Backup reconciliation failed: {0}")]
    Backup(#[from] BackupError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backup settings could not be loaded
    #[error("Invalid backup settings: {0}")]
    Settings(#[from] ConfigError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
