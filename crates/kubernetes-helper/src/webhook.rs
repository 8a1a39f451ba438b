//! Creation-preventing admission webhook
//!
//! A `ValidatingWebhookConfiguration` pointing at an address nothing listens
//! on. With `failurePolicy: Fail` the API server rejects every matching create
//! request, which freezes creation of the given resources without running an
//! actual webhook server.

use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Name of the webhook configuration installed into user clusters during deletion.
pub const CLUSTER_CLEANUP_WEBHOOK_NAME: &str = "kubernetes-cluster-cleanup";

/// Webhook names must be domains with at least three segments.
const WEBHOOK_NAME: &str = "kubernetes.cluster.cleanup";
const UNREACHABLE_URL: &str = "https://127.0.0.1:1";

/// Builds a webhook configuration rejecting all creates of `resources` in `api_group`.
pub fn creation_preventing_webhook(
    name: &str,
    api_group: &str,
    resources: &[&str],
) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                "description".to_string(),
                "This webhook configuration exists to prevent creation of new resources in a cluster that is being terminated".to_string(),
            )])),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: WEBHOOK_NAME.to_string(),
            client_config: WebhookClientConfig {
                url: Some(UNREACHABLE_URL.to_string()),
                ..Default::default()
            },
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec!["CREATE".to_string()]),
                api_groups: Some(vec![api_group.to_string()]),
                api_versions: Some(vec!["*".to_string()]),
                resources: Some(resources.iter().map(ToString::to_string).collect()),
                ..Default::default()
            }]),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            admission_review_versions: vec!["v1".to_string()],
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_rejects_creates_only() {
        let config = creation_preventing_webhook(
            CLUSTER_CLEANUP_WEBHOOK_NAME,
            "",
            &["persistentvolumes", "persistentvolumeclaims"],
        );
        assert_eq!(config.metadata.name.as_deref(), Some("kubernetes-cluster-cleanup"));

        let webhooks = config.webhooks.unwrap_or_default();
        assert_eq!(webhooks.len(), 1);
        let webhook = &webhooks[0];
        assert_eq!(webhook.client_config.url.as_deref(), Some("https://127.0.0.1:1"));
        assert_eq!(webhook.failure_policy.as_deref(), Some("Fail"));
        assert_eq!(webhook.side_effects, "None");

        let rule = &webhook.rules.clone().unwrap_or_default()[0];
        assert_eq!(rule.operations, Some(vec!["CREATE".to_string()]));
        assert_eq!(rule.api_groups, Some(vec![String::new()]));
        assert_eq!(
            rule.resources,
            Some(vec![
                "persistentvolumes".to_string(),
                "persistentvolumeclaims".to_string()
            ])
        );
    }
}
