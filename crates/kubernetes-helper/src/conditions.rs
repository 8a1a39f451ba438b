//! Condition lookup across object kinds.

use k8s_openapi::api::batch::v1::JobCondition;
use k8s_openapi::api::core::v1::{NodeCondition, PodCondition};

/// A `{type, status}` condition record as found on most Kubernetes objects.
pub trait ConditionLike {
    fn condition_type(&self) -> &str;
    fn condition_status(&self) -> &str;
}

macro_rules! impl_condition_like {
    ($($ty:ty),*) => {
        $(
            impl ConditionLike for $ty {
                fn condition_type(&self) -> &str {
                    &self.type_
                }

                fn condition_status(&self) -> &str {
                    &self.status
                }
            }
        )*
    };
}

impl_condition_like!(JobCondition, NodeCondition, PodCondition);

/// First condition with the given type and status.
pub fn find_condition<'a, C: ConditionLike>(
    conditions: &'a [C],
    condition_type: &str,
    status: &str,
) -> Option<&'a C> {
    conditions
        .iter()
        .find(|c| c.condition_type() == condition_type && c.condition_status() == status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_condition(type_: &str, status: &str, message: &str) -> JobCondition {
        JobCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_condition_matches_type_and_status() {
        let conditions = vec![
            job_condition("Complete", "False", "not yet"),
            job_condition("Failed", "True", "BackoffLimitExceeded"),
        ];

        let failed = find_condition(&conditions, "Failed", "True");
        assert_eq!(
            failed.and_then(|c| c.message.as_deref()),
            Some("BackoffLimitExceeded")
        );
        assert!(find_condition(&conditions, "Complete", "True").is_none());
        assert!(find_condition::<JobCondition>(&[], "Complete", "True").is_none());
    }
}
