//! Shared setup for the deletion tests.

use super::Deletion;
use crate::metrics::DeletionMetrics;
use crate::user_cluster::FixedProvider;
use chrono::Duration;
use crds::{CloudSpec, Cluster, ClusterSpec, ClusterStatus, ProviderCloudSpec};
use kubernetes_helper::time::from_chrono;
use kubernetes_helper::{Clock, EventRecorder, FakeClock, MockEventPublisher, RecordedEvent};
use resource_client::MockKubeClient;
use std::sync::Arc;

pub(crate) const NOW: i64 = 1_700_000_000;
pub(crate) const CLUSTER_NAME: &str = "abc";
pub(crate) const CLUSTER_NAMESPACE: &str = "cluster-abc";

pub(crate) type TestDeletion = Deletion<MockKubeClient, FixedProvider<MockKubeClient>>;

pub(crate) struct Fixture {
    pub seed: MockKubeClient,
    pub user: MockKubeClient,
    pub clock: FakeClock,
    pub events: MockEventPublisher,
    pub metrics: DeletionMetrics,
    pub deletion: TestDeletion,
}

impl Fixture {
    pub fn new() -> Self {
        let seed = MockKubeClient::new();
        let user = MockKubeClient::new();
        let clock = FakeClock::at_unix(NOW);
        seed.set_now(clock.now());
        user.set_now(clock.now());

        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let seed_client = Arc::new(seed.clone());
        let events = MockEventPublisher::new();
        let recorder = EventRecorder::new(Arc::new(events.clone()));
        let metrics = DeletionMetrics::new().unwrap();
        let deletion = Deletion::new(
            seed_client,
            Arc::new(FixedProvider::new(Arc::new(user.clone()))),
            recorder,
            shared_clock,
            metrics.clone(),
            "kubermatic",
        );

        Self {
            seed,
            user,
            clock,
            events,
            metrics,
            deletion,
        }
    }

    /// Stores a cluster whose deletion was requested `deleted_ago` before now.
    pub fn deleting_cluster(&self, cloud: CloudSpec, finalizers: &[&str], deleted_ago: Duration) -> Cluster {
        let mut cluster = Cluster::new(
            CLUSTER_NAME,
            ClusterSpec {
                cloud,
                ..Default::default()
            },
        );
        cluster.metadata.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
        cluster.metadata.deletion_timestamp = from_chrono(self.clock.now() - deleted_ago);
        cluster.status = Some(ClusterStatus {
            namespace_name: CLUSTER_NAMESPACE.to_string(),
        });
        self.seed.add(cluster)
    }

    pub fn stored_cluster(&self) -> Option<Cluster> {
        self.seed.get_object(None, CLUSTER_NAME)
    }

    pub fn events(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events.with_reason(reason)
    }
}

pub(crate) fn aws() -> CloudSpec {
    CloudSpec {
        aws: Some(ProviderCloudSpec::default()),
        ..Default::default()
    }
}

pub(crate) fn hetzner() -> CloudSpec {
    CloudSpec {
        hetzner: Some(ProviderCloudSpec::default()),
        ..Default::default()
    }
}
