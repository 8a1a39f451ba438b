//! Kubernetes helpers shared by the seed controllers
//!
//! - **Finalizers**: set operations on an object's finalizer list and
//!   conflict-retrying add/remove against the API
//! - **Webhooks**: the creation-preventing webhook configuration
//! - **Conditions**: lookup of `{type, status}` condition records
//! - **Events**: an event recorder over kube's event `Recorder`
//! - **Clock**: an injectable time source

pub mod clock;
pub mod conditions;
pub mod error;
pub mod events;
pub mod finalizers;
pub mod time;
pub mod webhook;


pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::FakeClock;
pub use conditions::{find_condition, ConditionLike};
pub use error::HelperError;
pub use events::{actions, EventPublisher, EventRecorder, EventType, KubeEventPublisher};
#[cfg(any(test, feature = "test-util"))]
pub use events::{MockEventPublisher, RecordedEvent};
pub use finalizers::{
    add_finalizer, has_any_finalizer, has_finalizer, has_finalizer_superset, has_only_finalizer,
    is_deleting, remove_finalizer, try_add_finalizer, try_patch, try_remove_finalizer,
};
pub use webhook::{creation_preventing_webhook, CLUSTER_CLEANUP_WEBHOOK_NAME};
