//! Error types for the resource client.
//!
//! Callers mostly care about the class of a failure (missing object,
//! optimistic-lock collision, kind not installed) rather than the exact
//! API response, so errors are classified once here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeClientError {
    /// The object does not exist
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// Optimistic lock collision, the object changed since it was read
    #[error("conflict on {kind} {name:?}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// Create for an object that already exists
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    /// The kind is not served by the API server (CRD not installed)
    #[error("no matches for kind {kind}")]
    NoMatch { kind: String },

    /// Any other API server response
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// Converting between typed and dynamic objects failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport or client-side failure
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),
}

impl KubeClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }
}

/// Maps a not-found error to `Ok(None)`.
pub fn ignore_not_found<T>(result: Result<T, KubeClientError>) -> Result<Option<T>, KubeClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Maps an already-exists error to `Ok(None)`.
pub fn ignore_already_exists<T>(
    result: Result<T, KubeClientError>,
) -> Result<Option<T>, KubeClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_already_exists() => Ok(None),
        Err(e) => Err(e),
    }
}
