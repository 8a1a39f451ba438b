//! Mock KubeClient for unit testing
//!
//! This module provides an in-memory implementation of `KubeClientTrait` that
//! behaves close enough to an API server for reconciler tests:
//! - `store.rs` - object storage, resource versions, finalizer-aware deletion
//! - `selectors.rs` - label and field selector matching
//!
//! Tests can pin the clock used for server-side timestamps, inject one-shot
//! failures per verb and kind, and count calls per verb and kind.

mod selectors;
mod store;

use crate::client::optimistic_patch;
use crate::client_trait::{DeletePropagation, KubeClientTrait, KubeObject, ListOptions};
use crate::error::KubeClientError;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use store::{ObjectKey, Store};

/// API verbs, used to address injected failures and call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Delete,
    DeleteAllOf,
    Patch,
    PatchStatus,
}

#[derive(Debug, Default)]
struct State {
    store: Store,
    failures: Vec<(Verb, String, KubeClientError)>,
    calls: BTreeMap<(Verb, String), usize>,
    now: Option<DateTime<Utc>>,
}

impl State {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// Mock KubeClient for testing
///
/// Clones share the same store, so a test can keep a handle while the
/// reconciler under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockKubeClient {
    state: Arc<Mutex<State>>,
}

fn key_of<K: KubeObject>(namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        namespace: namespace.unwrap_or_default().to_string(),
        name: name.to_string(),
    }
}

fn key_for<K: KubeObject>(obj: &K) -> ObjectKey {
    let name = match obj.meta().name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!(
            "{}{}",
            obj.meta().generate_name.as_deref().unwrap_or_default(),
            &uuid::Uuid::new_v4().simple().to_string()[..5]
        ),
    };
    key_of::<K>(obj.meta().namespace.as_deref(), &name)
}

fn decode<K: KubeObject>(value: serde_json::Value) -> Result<K, KubeClientError> {
    Ok(serde_json::from_value(value)?)
}

impl MockKubeClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns an injected failure, if one is pending.
    fn begin<K: KubeObject>(&self, verb: Verb) -> Result<MutexGuard<'_, State>, KubeClientError> {
        let kind = K::kind(&()).to_string();
        let mut state = self.lock();
        *state.calls.entry((verb, kind.clone())).or_default() += 1;
        if let Some(index) = state
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && *k == kind)
        {
            let (_, _, err) = state.failures.remove(index);
            return Err(err);
        }
        Ok(state)
    }

    /// Pin the time used for creation and deletion timestamps.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = Some(now);
    }

    /// Make the next `verb` call on `kind` fail with `err`.
    pub fn fail_next(&self, verb: Verb, kind: &str, err: KubeClientError) {
        self.lock().failures.push((verb, kind.to_string(), err));
    }

    /// Number of `verb` calls made on `kind` so far.
    pub fn calls(&self, verb: Verb, kind: &str) -> usize {
        self.lock()
            .calls
            .get(&(verb, kind.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Add an object to the mock store (for test setup)
    ///
    /// Existing objects with the same name are replaced. A deletion timestamp
    /// set on `obj` is kept.
    pub fn add<K: KubeObject>(&self, obj: K) -> K {
        let key = key_for(&obj);
        let value = serde_json::to_value(&obj).unwrap();
        let mut state = self.lock();
        let now = state.now();
        let stored = state.store.insert(key, value, now, true).unwrap();
        decode(stored).unwrap()
    }

    /// Current stored version of an object, if it exists.
    pub fn get_object<K: KubeObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let state = self.lock();
        state
            .store
            .get(&key_of::<K>(namespace, name))
            .ok()
            .map(|value| decode(value).unwrap())
    }

    /// All stored objects of a kind.
    pub fn objects<K: KubeObject>(&self) -> Vec<K> {
        let state = self.lock();
        state
            .store
            .list(&K::api_version(&()), &K::kind(&()), &ListOptions::all())
            .into_iter()
            .map(|value| decode(value).unwrap())
            .collect()
    }

    pub fn exists<K: KubeObject>(&self, namespace: Option<&str>, name: &str) -> bool {
        self.lock().store.contains(&key_of::<K>(namespace, name))
    }
}

#[async_trait::async_trait]
impl KubeClientTrait for MockKubeClient {
    async fn get<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, KubeClientError> {
        let state = self.begin::<K>(Verb::Get)?;
        decode(state.store.get(&key_of::<K>(namespace, name))?)
    }

    async fn list<K: KubeObject>(&self, options: &ListOptions) -> Result<Vec<K>, KubeClientError> {
        let state = self.begin::<K>(Verb::List)?;
        state
            .store
            .list(&K::api_version(&()), &K::kind(&()), options)
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, KubeClientError> {
        let mut state = self.begin::<K>(Verb::Create)?;
        let mut value = serde_json::to_value(obj)?;
        if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            for field in ["uid", "resourceVersion", "creationTimestamp", "deletionTimestamp"] {
                metadata.remove(field);
            }
        }
        let now = state.now();
        decode(state.store.insert(key_for(obj), value, now, false)?)
    }

    async fn delete<K: KubeObject>(
        &self,
        obj: &K,
        _propagation: Option<DeletePropagation>,
    ) -> Result<(), KubeClientError> {
        let mut state = self.begin::<K>(Verb::Delete)?;
        let now = state.now();
        state
            .store
            .delete(&key_of::<K>(obj.meta().namespace.as_deref(), &obj.name_any()), now)
    }

    async fn delete_all_of<K: KubeObject>(&self, options: &ListOptions) -> Result<(), KubeClientError> {
        let mut state = self.begin::<K>(Verb::DeleteAllOf)?;
        let now = state.now();
        let matching = state
            .store
            .list(&K::api_version(&()), &K::kind(&()), options);
        for value in matching {
            let obj: K = decode(value)?;
            state
                .store
                .delete(&key_of::<K>(obj.meta().namespace.as_deref(), &obj.name_any()), now)?;
        }
        Ok(())
    }

    async fn patch<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError> {
        let mut state = self.begin::<K>(Verb::Patch)?;
        let Some(patch) = optimistic_patch(old, new, false)? else {
            return Ok(new.clone());
        };
        let key = key_of::<K>(old.meta().namespace.as_deref(), &old.name_any());
        decode(state.store.patch(&key, &patch, false)?)
    }

    async fn patch_status<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError> {
        let mut state = self.begin::<K>(Verb::PatchStatus)?;
        let Some(patch) = optimistic_patch(old, new, true)? else {
            return Ok(new.clone());
        };
        let key = key_of::<K>(old.meta().namespace.as_deref(), &old.name_any());
        decode(state.store.patch(&key, &patch, true)?)
    }
}
