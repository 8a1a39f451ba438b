//! Kubernetes resource client
//!
//! A small, typed client seam over the Kubernetes API used by the seed
//! controllers. Reconcilers are written against [`KubeClientTrait`] so they
//! can run against a real API server through [`KubeClient`] or against the
//! in-memory [`MockKubeClient`] in tests.
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::core::v1::Service;
//! use resource_client::{KubeClient, KubeClientTrait, ListOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClient::try_default().await?;
//! let services: Vec<Service> = client.list(&ListOptions::namespaced("kube-system")).await?;
//! for service in &services {
//!     client.delete(service, None).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error classification**: not-found, conflict, already-exists and no-match
//!   are distinct variants of [`KubeClientError`]
//! - **Optimistic locking**: patches are merge patches computed from an old and a
//!   new copy, carrying the old resource version
//! - **Mocking**: `test-util` enables [`MockKubeClient`]

pub mod client;
pub mod error;
pub mod patch;
#[path = "trait.rs"]
pub mod client_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClient;
pub use client_trait::{DeletePropagation, KubeClientTrait, KubeObject, ListOptions};
pub use error::{ignore_already_exists, ignore_not_found, KubeClientError};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockKubeClient, Verb};
