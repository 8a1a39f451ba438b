//! KubeClientTrait for mocking
//!
//! This trait abstracts the Kubernetes API so that reconcilers can be driven
//! against an in-memory store in unit tests. `KubeClient` implements it over a
//! real `kube::Client`; `MockKubeClient` (feature `test-util`) implements it in
//! memory.

use crate::error::KubeClientError;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Any Kubernetes object the client can handle.
///
/// Both built-in `k8s_openapi` types and `kube::CustomResource` types satisfy
/// this through the blanket implementation.
pub trait KubeObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Scope and selectors of a list or delete-collection call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// `None` lists across all namespaces (or cluster-scoped objects)
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListOptions {
    /// Objects of one namespace.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Cluster-scoped objects, or namespaced objects across all namespaces.
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }
}

/// How dependents of a deleted object are garbage collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePropagation {
    Background,
    Foreground,
    Orphan,
}

/// Trait for Kubernetes API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait KubeClientTrait: Send + Sync {
    /// Fetch one object. Pass `None` as namespace for cluster-scoped kinds.
    async fn get<K: KubeObject>(&self, namespace: Option<&str>, name: &str)
        -> Result<K, KubeClientError>;

    async fn list<K: KubeObject>(&self, options: &ListOptions) -> Result<Vec<K>, KubeClientError>;

    /// Create an object in the namespace recorded in its metadata.
    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, KubeClientError>;

    /// Request deletion. Objects with finalizers stay around with a
    /// deletion timestamp until their finalizers are gone.
    async fn delete<K: KubeObject>(
        &self,
        obj: &K,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), KubeClientError>;

    async fn delete_all_of<K: KubeObject>(&self, options: &ListOptions) -> Result<(), KubeClientError>;

    /// Merge-patch `old` into `new`. The patch carries the resource version of
    /// `old`, so it fails with a conflict when the object changed in between.
    async fn patch<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError>;

    /// Like `patch`, on the status subresource.
    async fn patch_status<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError>;
}
