//! In-memory object store backing `MockKubeClient`
//!
//! Objects are kept as JSON so that any kind can be stored and patched the
//! same way the API server does it.

use super::selectors::{matches_fields, matches_labels};
use crate::client_trait::ListOptions;
use crate::error::KubeClientError;
use crate::patch::apply_merge_patch;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// apiVersion, kind, namespace, name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    fn not_found(&self) -> KubeClientError {
        KubeClientError::NotFound {
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }
}

fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn finalizers(obj: &Value) -> usize {
    obj.pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

fn is_deleting(obj: &Value) -> bool {
    obj.pointer("/metadata/deletionTimestamp")
        .is_some_and(|ts| !ts.is_null())
}

fn set_metadata(obj: &mut Value, field: &str, value: Value) {
    if !obj["metadata"].is_object() {
        obj["metadata"] = json!({});
    }
    obj["metadata"][field] = value;
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
}

impl Store {
    fn next_resource_version(&mut self) -> Value {
        self.resource_version += 1;
        Value::String(self.resource_version.to_string())
    }

    /// Stores `obj` under `key`, filling in server-side metadata.
    pub fn insert(
        &mut self,
        key: ObjectKey,
        mut obj: Value,
        now: DateTime<Utc>,
        overwrite: bool,
    ) -> Result<Value, KubeClientError> {
        if !overwrite && self.objects.contains_key(&key) {
            return Err(KubeClientError::AlreadyExists {
                kind: key.kind,
                name: key.name,
            });
        }

        obj["apiVersion"] = Value::String(key.api_version.clone());
        obj["kind"] = Value::String(key.kind.clone());
        set_metadata(&mut obj, "name", Value::String(key.name.clone()));
        if !key.namespace.is_empty() {
            set_metadata(&mut obj, "namespace", Value::String(key.namespace.clone()));
        }
        if !obj["metadata"]["uid"].is_string() {
            set_metadata(&mut obj, "uid", Value::String(uuid::Uuid::new_v4().to_string()));
        }
        if !obj["metadata"]["creationTimestamp"].is_string() {
            set_metadata(&mut obj, "creationTimestamp", timestamp(now));
        }
        let resource_version = self.next_resource_version();
        set_metadata(&mut obj, "resourceVersion", resource_version);

        self.objects.insert(key, obj.clone());
        Ok(obj)
    }

    pub fn get(&self, key: &ObjectKey) -> Result<Value, KubeClientError> {
        self.objects.get(key).cloned().ok_or_else(|| key.not_found())
    }

    pub fn list(&self, api_version: &str, kind: &str, options: &ListOptions) -> Vec<Value> {
        self.objects
            .iter()
            .filter(|(key, _)| key.api_version == api_version && key.kind == kind)
            .filter(|(key, _)| {
                options
                    .namespace
                    .as_deref()
                    .is_none_or(|namespace| key.namespace == namespace)
            })
            .filter(|(_, obj)| {
                options
                    .label_selector
                    .as_deref()
                    .is_none_or(|selector| matches_labels(obj, selector))
            })
            .filter(|(_, obj)| {
                options
                    .field_selector
                    .as_deref()
                    .is_none_or(|selector| matches_fields(obj, selector))
            })
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Removes the object, or marks it as deleting while finalizers remain.
    pub fn delete(&mut self, key: &ObjectKey, now: DateTime<Utc>) -> Result<(), KubeClientError> {
        let Some(obj) = self.objects.get(key) else {
            return Err(key.not_found());
        };

        if finalizers(obj) == 0 {
            self.objects.remove(key);
            return Ok(());
        }
        if is_deleting(obj) {
            return Ok(());
        }

        let resource_version = self.next_resource_version();
        if let Some(obj) = self.objects.get_mut(key) {
            set_metadata(obj, "deletionTimestamp", timestamp(now));
            set_metadata(obj, "resourceVersion", resource_version);
        }
        Ok(())
    }

    /// Applies a merge patch. `status_only` patches touch nothing but the
    /// status, regular patches never touch it.
    pub fn patch(
        &mut self,
        key: &ObjectKey,
        patch: &Value,
        status_only: bool,
    ) -> Result<Value, KubeClientError> {
        let Some(current) = self.objects.get(key) else {
            return Err(key.not_found());
        };

        let expected = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        let actual = current
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        if let Some(expected) = expected {
            if Some(expected) != actual {
                return Err(KubeClientError::Conflict {
                    kind: key.kind.clone(),
                    name: key.name.clone(),
                    message: format!(
                        "the object has been modified; please apply your changes to the latest version (expected {expected}, found {})",
                        actual.unwrap_or_default()
                    ),
                });
            }
        }

        let mut effective = patch.clone();
        if let Value::Object(map) = &mut effective {
            if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
                metadata.remove("resourceVersion");
            }
            if status_only {
                map.retain(|k, _| k == "status");
            } else {
                map.remove("status");
            }
        }

        let mut updated = current.clone();
        apply_merge_patch(&mut updated, &effective);
        let resource_version = self.next_resource_version();
        set_metadata(&mut updated, "resourceVersion", resource_version);

        if is_deleting(&updated) && finalizers(&updated) == 0 {
            self.objects.remove(key);
        } else {
            self.objects.insert(key.clone(), updated.clone());
        }
        Ok(updated)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.contains_key(key)
    }
}
