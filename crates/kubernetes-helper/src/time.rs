//! Conversions between `chrono` and the Kubernetes `Time` wrapper.
//!
//! Both sides speak RFC 3339 on the wire, so the conversion goes through that
//! representation instead of depending on the datetime library behind `Time`.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;

pub fn to_chrono(time: &Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn from_chrono(time: DateTime<Utc>) -> Option<Time> {
    serde_json::from_value(serde_json::Value::String(
        time.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
    .ok()
}

pub fn deletion_timestamp<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    obj.meta().deletion_timestamp.as_ref().and_then(to_chrono)
}

pub fn creation_timestamp<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    obj.meta().creation_timestamp.as_ref().and_then(to_chrono)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_whole_seconds() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let time = from_chrono(now);
        assert!(time.is_some());
        assert_eq!(time.as_ref().and_then(to_chrono), Some(now));
    }
}
