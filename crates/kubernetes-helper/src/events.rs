//! Kubernetes event recording
//!
//! Events go through `kube::runtime::events::Recorder`, which folds repeats
//! of the same reason on the same object into one event series. Events are
//! advisory: a failure to publish one is logged and otherwise ignored so
//! that it can never fail a reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, Recorder, Reporter};
use kube::{Client, Resource};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub use kube::runtime::events::EventType;

/// Event actions, shown in the ACTION column of `kubectl get events`.
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const CLEANUP: &str = "Cleanup";
}

/// Fire-and-forget publishing of events about an object.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the API server.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `component` is reported as the event's reporting controller.
    pub fn new(client: Client, component: &str) -> Self {
        let reporter = Reporter {
            controller: component.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, regarding).await {
            warn!(
                "Failed to publish {} event on {} {}: {}",
                reason,
                regarding.kind.as_deref().unwrap_or_default(),
                regarding.name.as_deref().unwrap_or_default(),
                e
            );
        }
    }
}

/// Records events against typed objects.
#[derive(Clone)]
pub struct EventRecorder {
    publisher: Arc<dyn EventPublisher>,
}

impl fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder").finish_non_exhaustive()
    }
}

impl EventRecorder {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Recorder publishing through the API server as `component`.
    pub fn kube(client: Client, component: &str) -> Self {
        Self::new(Arc::new(KubeEventPublisher::new(client, component)))
    }

    pub async fn normal<K>(&self, obj: &K, reason: &str, message: impl Into<String>)
    where
        K: Resource<DynamicType = ()>,
    {
        self.record(obj, EventType::Normal, reason, actions::RECONCILE, message)
            .await;
    }

    pub async fn warning<K>(&self, obj: &K, reason: &str, message: impl Into<String>)
    where
        K: Resource<DynamicType = ()>,
    {
        self.record(obj, EventType::Warning, reason, actions::RECONCILE, message)
            .await;
    }

    pub async fn record<K>(
        &self,
        obj: &K,
        type_: EventType,
        reason: &str,
        action: &str,
        message: impl Into<String>,
    ) where
        K: Resource<DynamicType = ()>,
    {
        let regarding = obj.object_ref(&());
        let message = message.into();
        debug!(
            "{:?} event {} on {} {}: {}",
            type_,
            reason,
            K::kind(&()),
            regarding.name.as_deref().unwrap_or_default(),
            message
        );
        self.publisher
            .publish(&regarding, type_, reason, action, Some(message))
            .await;
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockEventPublisher, RecordedEvent};

#[cfg(any(test, feature = "test-util"))]
mod mock {
    use super::{EventPublisher, EventType};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ObjectReference;
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Debug, Clone)]
    pub struct RecordedEvent {
        pub regarding: ObjectReference,
        pub type_: EventType,
        pub reason: String,
        pub action: String,
        pub note: Option<String>,
    }

    /// Keeps every published event in memory. Clones share the same log.
    #[derive(Debug, Clone, Default)]
    pub struct MockEventPublisher {
        events: Arc<Mutex<Vec<RecordedEvent>>>,
    }

    impl MockEventPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<RecordedEvent> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
            self.events()
                .into_iter()
                .filter(|event| event.reason == reason)
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for MockEventPublisher {
        async fn publish(
            &self,
            regarding: &ObjectReference,
            type_: EventType,
            reason: &str,
            action: &str,
            note: Option<String>,
        ) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedEvent {
                    regarding: regarding.clone(),
                    type_,
                    reason: reason.to_string(),
                    action: action.to_string(),
                    note,
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Namespace, Service};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[tokio::test]
    async fn test_event_references_the_object() {
        let publisher = MockEventPublisher::new();
        let recorder = EventRecorder::new(Arc::new(publisher.clone()));
        let service = Service {
            metadata: ObjectMeta {
                name: Some("lb".to_string()),
                namespace: Some("kube-system".to_string()),
                uid: Some("uid-lb".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        recorder
            .warning(&service, "ReconcilingError", "something broke")
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(matches!(event.type_, EventType::Warning));
        assert_eq!(event.reason, "ReconcilingError");
        assert_eq!(event.action, actions::RECONCILE);
        assert_eq!(event.note.as_deref(), Some("something broke"));
        assert_eq!(event.regarding.kind.as_deref(), Some("Service"));
        assert_eq!(event.regarding.namespace.as_deref(), Some("kube-system"));
        assert_eq!(event.regarding.uid.as_deref(), Some("uid-lb"));
    }

    #[tokio::test]
    async fn test_cluster_scoped_object_has_no_namespace() {
        let publisher = MockEventPublisher::new();
        let recorder = EventRecorder::new(Arc::new(publisher.clone()));
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some("cluster-abc".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        recorder
            .record(&namespace, EventType::Normal, "Cleanup", actions::CLEANUP, "done")
            .await;

        let events = publisher.with_reason("Cleanup");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].regarding.name.as_deref(), Some("cluster-abc"));
        assert_eq!(events[0].regarding.namespace, None);
        assert_eq!(events[0].action, "Cleanup");
        assert!(publisher.with_reason("Other").is_empty());
    }
}
