//! Label and field selector matching for the mock store

use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
enum Requirement<'a> {
    Equals(&'a str, &'a str),
    NotEquals(&'a str, &'a str),
    Exists(&'a str),
    NotExists(&'a str),
}

fn parse(selector: &str) -> Vec<Requirement<'_>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once("==") {
                Requirement::Equals(key.trim(), value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                Requirement::Equals(key.trim(), value.trim())
            } else if let Some(key) = term.strip_prefix('!') {
                Requirement::NotExists(key.trim())
            } else {
                Requirement::Exists(term)
            }
        })
        .collect()
}

/// Matches `metadata.labels` of a stored object.
pub(crate) fn matches_labels(obj: &Value, selector: &str) -> bool {
    let labels = obj.pointer("/metadata/labels").and_then(Value::as_object);
    let label = |key: &str| labels.and_then(|l| l.get(key)).and_then(Value::as_str);

    parse(selector).into_iter().all(|requirement| match requirement {
        Requirement::Equals(key, value) => label(key) == Some(value),
        Requirement::NotEquals(key, value) => label(key) != Some(value),
        Requirement::Exists(key) => label(key).is_some(),
        Requirement::NotExists(key) => label(key).is_none(),
    })
}

/// Matches dotted field paths such as `involvedObject.uid` or `spec.type`.
pub(crate) fn matches_fields(obj: &Value, selector: &str) -> bool {
    let field = |path: &str| {
        let pointer = format!("/{}", path.replace('.', "/"));
        match obj.pointer(&pointer) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    };

    parse(selector).into_iter().all(|requirement| match requirement {
        Requirement::Equals(path, value) => field(path) == value,
        Requirement::NotEquals(path, value) => field(path) != value,
        Requirement::Exists(_) | Requirement::NotExists(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_selector() {
        let obj = json!({"metadata": {"labels": {"app": "etcd", "cluster": "abc"}}});
        assert!(matches_labels(&obj, "app=etcd"));
        assert!(matches_labels(&obj, "app==etcd,cluster=abc"));
        assert!(!matches_labels(&obj, "app=etcd,cluster=def"));
        assert!(matches_labels(&obj, "app!=apiserver"));
        assert!(matches_labels(&obj, "cluster,!missing"));
        assert!(!matches_labels(&json!({"metadata": {}}), "app=etcd"));
    }

    #[test]
    fn test_field_selector() {
        let obj = json!({"involvedObject": {"uid": "1234"}, "metadata": {"name": "ev"}});
        assert!(matches_fields(&obj, "involvedObject.uid=1234"));
        assert!(!matches_fields(&obj, "involvedObject.uid=5678"));
        assert!(matches_fields(&obj, "metadata.name=ev,involvedObject.uid!=5678"));
    }
}
