//! Unit tests for LoadBalancer drain tracking

#[cfg(test)]
mod tests {
    use crate::deletion::fixtures::{aws, hetzner, Fixture, CLUSTER_NAME};
    use crate::deletion::load_balancers::tracked_load_balancers;
    use chrono::Duration;
    use crds::{
        Cluster, CLEANED_UP_LOADBALANCERS_ANNOTATION, IN_CLUSTER_LB_CLEANUP_FINALIZER,
        IN_CLUSTER_PV_CLEANUP_FINALIZER, NODE_DELETION_FINALIZER,
    };
    use k8s_openapi::api::core::v1::{Event, ObjectReference, Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;
    use kubernetes_helper::has_finalizer;
    use resource_client::{KubeClientError, Verb};

    fn with_tracked(fixture: &Fixture, cluster: Cluster, uids: &str) -> Cluster {
        let mut cluster = cluster;
        cluster
            .annotations_mut()
            .insert(CLEANED_UP_LOADBALANCERS_ANNOTATION.to_string(), uids.to_string());
        fixture.seed.add(cluster)
    }

    fn service(name: &str, service_type: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(service_type.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// LoadBalancer service held back by the cloud provider's cleanup finalizer.
    fn cloud_finalized_service(name: &str, uid: &str) -> Service {
        let mut service = service(name, "LoadBalancer");
        service.metadata.uid = Some(uid.to_string());
        service.metadata.finalizers = Some(vec!["service.kubernetes.io/load-balancer-cleanup".to_string()]);
        service
    }

    fn server_error() -> KubeClientError {
        KubeClientError::Api {
            code: 500,
            reason: "InternalError".to_string(),
            message: "etcdserver: request timed out".to_string(),
        }
    }

    fn deleted_lb_event(uid: &str) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some(format!("lb.{uid}")),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            reason: Some("DeletedLoadBalancer".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unconfirmed_lb_blocks_before_deadline() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::hours(1));
        let mut cluster = with_tracked(&fixture, cluster, "uid-1");

        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();

        assert!(!gone);
        assert_eq!(tracked_load_balancers(&cluster).into_iter().collect::<Vec<_>>(), vec!["uid-1"]);
    }

    #[tokio::test]
    async fn test_unconfirmed_lb_is_given_up_after_deadline() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::hours(3));
        let mut cluster = with_tracked(&fixture, cluster, "uid-1");

        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();

        assert!(gone);
        assert!((fixture.metrics.stale_lbs(CLUSTER_NAME) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_confirmed_lbs_are_not_counted_as_stale_after_deadline() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::hours(3));
        let mut cluster = with_tracked(&fixture, cluster, "uid-1,uid-2");
        fixture.user.add(deleted_lb_event("uid-1"));

        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();

        assert!(gone);
        assert!((fixture.metrics.stale_lbs(CLUSTER_NAME) - 1.0).abs() < f64::EPSILON);
        let stored = fixture.stored_cluster().unwrap();
        assert_eq!(
            stored.annotations().get(CLEANED_UP_LOADBALANCERS_ANNOTATION).map(String::as_str),
            Some("uid-2")
        );
    }

    #[tokio::test]
    async fn test_confirmed_lbs_are_dropped_from_annotation() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::minutes(5));
        let mut cluster = with_tracked(&fixture, cluster, "uid-1,uid-2");
        fixture.user.add(deleted_lb_event("uid-1"));

        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();
        assert!(!gone);
        assert_eq!(
            cluster.annotations().get(CLEANED_UP_LOADBALANCERS_ANNOTATION).map(String::as_str),
            Some("uid-2")
        );

        fixture.user.add(deleted_lb_event("uid-2"));
        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();
        assert!(gone);
        let stored = fixture.stored_cluster().unwrap();
        assert!(!stored.annotations().contains_key(CLEANED_UP_LOADBALANCERS_ANNOTATION));
    }

    #[tokio::test]
    async fn test_providers_without_event_are_not_checked() {
        let fixture = Fixture::new();
        let cluster = fixture.deleting_cluster(hetzner(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::minutes(5));
        let mut cluster = with_tracked(&fixture, cluster, "uid-1");

        let gone = fixture
            .deletion
            .check_if_all_loadbalancers_are_gone(&mut cluster, &fixture.user)
            .await
            .unwrap();

        assert!(gone);
        assert_eq!(fixture.user.calls(Verb::List, "Event"), 0);
    }

    #[tokio::test]
    async fn test_deleted_lbs_are_recorded_on_cluster() {
        let fixture = Fixture::new();
        let mut cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::minutes(5));
        let lb = fixture.user.add(service("ingress", "LoadBalancer"));
        fixture.user.add(service("internal", "ClusterIP"));

        let deleted = fixture
            .deletion
            .cleanup_lbs(&mut cluster, &fixture.user)
            .await
            .unwrap();

        assert!(deleted);
        assert!(!fixture.user.exists::<Service>(Some("default"), "ingress"));
        assert!(fixture.user.exists::<Service>(Some("default"), "internal"));
        let uid = lb.uid().unwrap();
        assert!(tracked_load_balancers(&cluster).contains(&uid));
        assert!(tracked_load_balancers(&fixture.stored_cluster().unwrap()).contains(&uid));
    }

    #[tokio::test]
    async fn test_deleting_lb_missing_from_annotation_is_recorded() {
        let fixture = Fixture::new();
        let mut cluster = fixture.deleting_cluster(aws(), &[IN_CLUSTER_LB_CLEANUP_FINALIZER], Duration::minutes(5));
        fixture.user.add(cloud_finalized_service("ingress", "uid-lb"));
        fixture.seed.fail_next(Verb::Patch, "Cluster", server_error());

        let err = fixture
            .deletion
            .cleanup_lbs(&mut cluster, &fixture.user)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to record deleted LoadBalancer"));
        assert!(tracked_load_balancers(&fixture.stored_cluster().unwrap()).is_empty());

        // the service is now deleting and would otherwise be skipped
        let mut cluster = fixture.stored_cluster().unwrap();
        let deleted = fixture
            .deletion
            .cleanup_lbs(&mut cluster, &fixture.user)
            .await
            .unwrap();
        assert!(deleted);
        assert!(tracked_load_balancers(&cluster).contains("uid-lb"));
        assert_eq!(fixture.user.calls(Verb::Delete, "Service"), 1);

        let deleted = fixture
            .deletion
            .cleanup_lbs(&mut cluster, &fixture.user)
            .await
            .unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_failed_lb_recording_keeps_lb_finalizer_until_confirmed() {
        let fixture = Fixture::new();
        let mut cluster = fixture.deleting_cluster(
            aws(),
            &[IN_CLUSTER_LB_CLEANUP_FINALIZER, IN_CLUSTER_PV_CLEANUP_FINALIZER, NODE_DELETION_FINALIZER],
            Duration::minutes(5),
        );
        fixture.user.add(cloud_finalized_service("ingress", "uid-lb"));
        fixture.seed.fail_next(Verb::Patch, "Cluster", server_error());

        assert!(fixture.deletion.cleanup_cluster(&mut cluster).await.is_err());

        let mut cluster = fixture.stored_cluster().unwrap();
        fixture.deletion.cleanup_cluster(&mut cluster).await.unwrap();
        assert!(has_finalizer(&cluster, &[IN_CLUSTER_LB_CLEANUP_FINALIZER]));
        assert!(tracked_load_balancers(&cluster).contains("uid-lb"));

        fixture.deletion.cleanup_cluster(&mut cluster).await.unwrap();
        assert!(has_finalizer(&cluster, &[IN_CLUSTER_LB_CLEANUP_FINALIZER]));

        fixture.user.add(deleted_lb_event("uid-lb"));
        fixture.deletion.cleanup_cluster(&mut cluster).await.unwrap();
        assert!(!has_finalizer(&cluster, &[IN_CLUSTER_LB_CLEANUP_FINALIZER]));
    }

    #[test]
    fn test_annotation_parsing_skips_empty_entries() {
        let mut cluster = Cluster::new("abc", crds::ClusterSpec::default());
        cluster
            .annotations_mut()
            .insert(CLEANED_UP_LOADBALANCERS_ANNOTATION.to_string(), ",a,,b".to_string());
        let uids: Vec<String> = tracked_load_balancers(&cluster).into_iter().collect();
        assert_eq!(uids, vec!["a".to_string(), "b".to_string()]);
    }
}
