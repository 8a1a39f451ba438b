//! Helper error types.

use resource_client::KubeClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("failed to add finalizers {finalizers:?} to {kind} {name}: {source}")]
    AddFinalizer {
        finalizers: Vec<String>,
        kind: String,
        name: String,
        #[source]
        source: KubeClientError,
    },

    #[error("failed to remove finalizers {finalizers:?} from {kind} {name}: {source}")]
    RemoveFinalizer {
        finalizers: Vec<String>,
        kind: String,
        name: String,
        #[source]
        source: KubeClientError,
    },

    #[error(transparent)]
    Client(#[from] KubeClientError),
}

impl HelperError {
    /// The underlying client error.
    pub fn client_error(&self) -> &KubeClientError {
        match self {
            Self::AddFinalizer { source, .. } | Self::RemoveFinalizer { source, .. } => source,
            Self::Client(source) => source,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.client_error().is_conflict()
    }
}
