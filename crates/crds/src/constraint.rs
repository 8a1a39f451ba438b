//! Constraint CRD
//!
//! OPA Gatekeeper constraint synced into the user cluster. Constraints are
//! stored in the cluster namespace of the seed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(group = "kubermatic.k8c.io", version = "v1", kind = "Constraint", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSpec {
    /// Name of the ConstraintTemplate this constraint instantiates
    pub constraint_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Resources the constraint applies to
    #[serde(default, rename = "match")]
    pub match_: serde_json::Value,

    /// Template parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}
