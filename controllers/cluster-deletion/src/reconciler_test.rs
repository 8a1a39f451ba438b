//! Unit tests for the Cluster reconciler

#[cfg(test)]
mod tests {
    use crate::deletion::fixtures::{hetzner, Fixture};
    use crate::reconciler::Reconciler;
    use chrono::Duration;
    use crds::{
        Cluster, ClusterSpec, CLUSTER_ROLE_BINDINGS_CLEANUP_FINALIZER, NAMESPACE_CLEANUP_FINALIZER,
        SERVICE_ACCOUNTS_CLEANUP_FINALIZER,
    };
    use kube_runtime::controller::Action;
    use crate::user_cluster::FixedProvider;
    use kubernetes_helper::{EventRecorder, MockEventPublisher};
    use resource_client::{KubeClientError, MockKubeClient, Verb};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    type TestReconciler = Reconciler<MockKubeClient, FixedProvider<MockKubeClient>>;

    fn reconciler(fixture: Fixture) -> (MockKubeClient, MockEventPublisher, TestReconciler) {
        let Fixture {
            seed,
            events,
            deletion,
            ..
        } = fixture;
        let recorder = EventRecorder::new(Arc::new(events.clone()));
        (seed, events, Reconciler::new(deletion, recorder))
    }

    fn reconciling_errors(events: &MockEventPublisher) -> usize {
        events.with_reason("ReconcilingError").len()
    }

    #[tokio::test]
    async fn test_live_cluster_is_ignored() {
        let fixture = Fixture::new();
        let mut cluster = Cluster::new("abc", ClusterSpec::default());
        cluster.metadata.finalizers = Some(vec![NAMESPACE_CLEANUP_FINALIZER.to_string()]);
        let cluster = fixture.seed.add(cluster);
        let (seed, _, reconciler) = reconciler(fixture);

        let action = reconciler.reconcile_cluster(&cluster).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(seed.calls(Verb::Patch, "Cluster"), 0);
    }

    #[tokio::test]
    async fn test_paused_cluster_is_ignored() {
        let fixture = Fixture::new();
        let mut cluster = fixture.deleting_cluster(hetzner(), &[NAMESPACE_CLEANUP_FINALIZER], Duration::minutes(1));
        cluster.spec.pause = true;
        let (seed, _, reconciler) = reconciler(fixture);

        let action = reconciler.reconcile_cluster(&cluster).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(seed.calls(Verb::Get, "Namespace"), 0);
    }

    #[tokio::test]
    async fn test_requeue_while_finalizers_remain() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(
            hetzner(),
            &[SERVICE_ACCOUNTS_CLEANUP_FINALIZER, "example.com/external-cleanup"],
            Duration::minutes(1),
        );
        let (_, _, reconciler) = reconciler(fixture);

        let action = reconciler.reconcile_cluster(&cluster).await.unwrap();

        assert_eq!(action, Action::requeue(StdDuration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_conflict_is_requeued_silently() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(
            hetzner(),
            &[CLUSTER_ROLE_BINDINGS_CLEANUP_FINALIZER],
            Duration::minutes(1),
        );
        for _ in 0..5 {
            fixture.seed.fail_next(
                Verb::Patch,
                "Cluster",
                KubeClientError::Conflict {
                    kind: "Cluster".to_string(),
                    name: "abc".to_string(),
                    message: "the object has been modified".to_string(),
                },
            );
        }
        let (_, events, reconciler) = reconciler(fixture);

        let action = reconciler.reconcile_cluster(&cluster).await.unwrap();

        assert_eq!(action, Action::requeue(StdDuration::from_secs(30)));
        assert_eq!(reconciling_errors(&events), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported_as_event() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(
            hetzner(),
            &[SERVICE_ACCOUNTS_CLEANUP_FINALIZER],
            Duration::minutes(1),
        );
        fixture.seed.fail_next(
            Verb::List,
            "ServiceAccount",
            KubeClientError::Api {
                code: 500,
                reason: "InternalError".to_string(),
                message: "etcdserver: request timed out".to_string(),
            },
        );
        let (_, events, reconciler) = reconciler(fixture);

        let result = reconciler.reconcile_cluster(&cluster).await;

        assert!(result.is_err());
        assert_eq!(reconciling_errors(&events), 1);
    }
}
