//! Cluster CRD
//!
//! A user cluster managed by the seed. Cluster objects are cluster-scoped;
//! the control plane of each one lives in its own seed namespace, recorded
//! in `status.namespaceName` once provisioned.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Deletes LoadBalancer services inside the user cluster.
pub const IN_CLUSTER_LB_CLEANUP_FINALIZER: &str = "kubermatic.k8c.io/cleanup-in-cluster-lb";
/// Deletes PersistentVolumes, PersistentVolumeClaims and the pods using them inside the user cluster.
pub const IN_CLUSTER_PV_CLEANUP_FINALIZER: &str = "kubermatic.k8c.io/cleanup-in-cluster-pv";
/// Deletes all MachineDeployments, MachineSets and Machines of the user cluster.
pub const NODE_DELETION_FINALIZER: &str = "kubermatic.k8c.io/delete-nodes";
/// Deletes the cluster namespace in the seed.
pub const NAMESPACE_CLEANUP_FINALIZER: &str = "kubermatic.k8c.io/cleanup-namespace";
/// Deletes the cloud provider credentials secret.
pub const CREDENTIALS_SECRETS_CLEANUP_FINALIZER: &str =
    "kubermatic.k8c.io/cleanup-credentials-secrets";
/// Deletes the EtcdBackupConfigs of the cluster.
pub const ETCD_BACKUP_CONFIG_CLEANUP_FINALIZER: &str =
    "kubermatic.k8c.io/cleanup-etcdbackupconfigs";
/// Deletes the OPA constraints of the cluster.
pub const KUBERMATIC_CONSTRAINT_CLEANUP_FINALIZER: &str =
    "kubermatic.k8c.io/cleanup-kubermatic-constraints";
/// Legacy finalizer; cluster role bindings are garbage collected through owner references.
pub const CLUSTER_ROLE_BINDINGS_CLEANUP_FINALIZER: &str =
    "kubermatic.k8c.io/cleanup-cluster-role-bindings";
/// Deletes seed ServiceAccounts labelled with the cluster name.
pub const SERVICE_ACCOUNTS_CLEANUP_FINALIZER: &str = "kubermatic.k8c.io/cleanup-service-accounts";

/// Comma separated UIDs of LoadBalancer services deleted during cluster teardown.
pub const CLEANED_UP_LOADBALANCERS_ANNOTATION: &str = "kubermatic.k8c.io/cleaned-up-loadbalancers";
/// Set on user cluster nodes to stop the machine controller from draining them.
pub const SKIP_EVICTION_ANNOTATION: &str = "kubermatic.k8c.io/skip-eviction";
/// Label put on seed objects that belong to one cluster.
pub const CLUSTER_NAME_LABEL: &str = "kubermatic.k8c.io/cluster";

const CREDENTIAL_PREFIX: &str = "credential";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8c.io",
    version = "v1",
    kind = "Cluster",
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Display name shown in the dashboard
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub human_readable_name: String,

    /// Cloud provider the cluster runs on
    #[serde(default)]
    pub cloud: CloudSpec,

    /// Paused clusters are ignored by all controllers
    #[serde(default)]
    pub pause: bool,
}

/// Provider specific settings. Exactly one provider is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub datacenter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digitalocean: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hetzner: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubevirt: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<ProviderCloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bringyourown: Option<ProviderCloudSpec>,
}

/// Opaque provider settings (region, network, credentials reference, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderCloudSpec {
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Seed namespace holding the control plane. Empty before provisioning
    /// and after the namespace has been torn down.
    #[serde(default)]
    pub namespace_name: String,
}

impl Cluster {
    /// Name of the cluster namespace, empty if none is provisioned.
    pub fn namespace_name(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |status| status.namespace_name.as_str())
    }

    /// Name of the secret holding the cloud provider credentials.
    pub fn secret_name(&self) -> String {
        let cluster_name = self.metadata.name.as_deref().unwrap_or_default();
        let cloud = &self.spec.cloud;
        let provider = [
            ("aws", cloud.aws.is_some()),
            ("azure", cloud.azure.is_some()),
            ("digitalocean", cloud.digitalocean.is_some()),
            ("gcp", cloud.gcp.is_some()),
            ("hetzner", cloud.hetzner.is_some()),
            ("openstack", cloud.openstack.is_some()),
            ("kubevirt", cloud.kubevirt.is_some()),
            ("vsphere", cloud.vsphere.is_some()),
        ]
        .into_iter()
        .find_map(|(provider, set)| set.then_some(provider));

        match provider {
            Some(provider) => format!("{CREDENTIAL_PREFIX}-{provider}-{cluster_name}"),
            None => String::new(),
        }
    }

    /// In-tree cloud providers that report LoadBalancer removal only through
    /// a `DeletedLoadBalancer` event on the service.
    pub fn requires_lb_deletion_confirmation(&self) -> bool {
        let cloud = &self.spec.cloud;
        cloud.aws.is_some() || cloud.azure.is_some() || cloud.openstack.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_cloud(cloud: CloudSpec) -> Cluster {
        Cluster::new(
            "abcd1234",
            ClusterSpec {
                cloud,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_secret_name_uses_provider() {
        let cluster = cluster_with_cloud(CloudSpec {
            openstack: Some(ProviderCloudSpec::default()),
            ..Default::default()
        });
        assert_eq!(cluster.secret_name(), "credential-openstack-abcd1234");
    }

    #[test]
    fn test_secret_name_empty_for_bring_your_own() {
        let cluster = cluster_with_cloud(CloudSpec {
            bringyourown: Some(ProviderCloudSpec::default()),
            ..Default::default()
        });
        assert!(cluster.secret_name().is_empty());
    }

    #[test]
    fn test_lb_confirmation_providers() {
        let aws = cluster_with_cloud(CloudSpec {
            aws: Some(ProviderCloudSpec::default()),
            ..Default::default()
        });
        let hetzner = cluster_with_cloud(CloudSpec {
            hetzner: Some(ProviderCloudSpec::default()),
            ..Default::default()
        });
        assert!(aws.requires_lb_deletion_confirmation());
        assert!(!hetzner.requires_lb_deletion_confirmation());
    }

    #[test]
    fn test_namespace_name_defaults_to_empty() {
        let cluster = cluster_with_cloud(CloudSpec::default());
        assert_eq!(cluster.namespace_name(), "");
    }
}
