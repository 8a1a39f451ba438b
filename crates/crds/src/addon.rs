//! Addon CRD
//!
//! An addon installed into a user cluster. Addons live in the cluster
//! namespace and are removed by the addon controller before the namespace goes.

use crate::etcd_backup_config::ClusterReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(group = "kubermatic.k8c.io", version = "v1", kind = "Addon", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Addon name, matching a directory in the addon image
    pub name: String,

    /// Cluster the addon is installed into
    pub cluster: ClusterReference,

    #[serde(default)]
    pub is_default: bool,
}
