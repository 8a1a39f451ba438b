//! Finalizer set operations
//!
//! Finalizers are treated as an unordered set of tokens. Each cleanup stage
//! owns one token and several stages can be pending at the same time, so all
//! checks are plain set relations. Mutations keep the list sorted and free of
//! duplicates.

use crate::error::HelperError;
use kube::{Resource, ResourceExt};
use resource_client::{KubeClientError, KubeClientTrait, KubeObject};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Attempts made by the `try_*` helpers before giving up on conflicts.
const RETRY_STEPS: usize = 5;
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

fn finalizer_set<K: Resource>(obj: &K) -> BTreeSet<&str> {
    obj.meta()
        .finalizers
        .iter()
        .flatten()
        .map(String::as_str)
        .collect()
}

/// True if the object carries all of the given finalizers.
pub fn has_finalizer<K: Resource>(obj: &K, names: &[&str]) -> bool {
    let set = finalizer_set(obj);
    names.iter().all(|name| set.contains(name))
}

pub fn has_any_finalizer<K: Resource>(obj: &K, names: &[&str]) -> bool {
    let set = finalizer_set(obj);
    names.iter().any(|name| set.contains(name))
}

/// True if the object carries exactly the given finalizers.
pub fn has_only_finalizer<K: Resource>(obj: &K, names: &[&str]) -> bool {
    finalizer_set(obj) == names.iter().copied().collect::<BTreeSet<_>>()
}

/// True if the given names are a superset of the object's finalizers, i.e.
/// the object carries no finalizer outside of `names`.
pub fn has_finalizer_superset<K: Resource>(obj: &K, names: &[&str]) -> bool {
    finalizer_set(obj).iter().all(|finalizer| names.contains(finalizer))
}

pub fn add_finalizer<K: Resource>(obj: &mut K, names: &[&str]) {
    let mut set: BTreeSet<String> = obj.finalizers().iter().cloned().collect();
    set.extend(names.iter().map(ToString::to_string));
    obj.meta_mut().finalizers = Some(set.into_iter().collect());
}

pub fn remove_finalizer<K: Resource>(obj: &mut K, names: &[&str]) {
    let set: BTreeSet<String> = obj
        .finalizers()
        .iter()
        .filter(|finalizer| !names.contains(&finalizer.as_str()))
        .cloned()
        .collect();
    obj.meta_mut().finalizers = Some(set.into_iter().collect());
}

/// True once deletion of the object was requested.
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Read-modify-patch loop against a fresh copy of `obj`.
///
/// `modify` returns false when there is nothing to change. Conflicts are
/// retried a few times; the caller's copy is replaced by the latest state.
async fn retry_patch<C, K, F>(client: &C, obj: &mut K, mut modify: F) -> Result<(), KubeClientError>
where
    C: KubeClientTrait + ?Sized,
    K: KubeObject,
    F: FnMut(&mut K) -> bool + Send,
{
    let namespace = obj.meta().namespace.clone();
    let name = obj.name_any();

    let mut attempt = 1;
    loop {
        let current: K = client.get(namespace.as_deref(), &name).await?;
        let mut updated = current.clone();
        if !modify(&mut updated) {
            *obj = current;
            return Ok(());
        }

        match client.patch(&current, &updated).await {
            Ok(patched) => {
                *obj = patched;
                return Ok(());
            }
            Err(e) if e.is_conflict() && attempt < RETRY_STEPS => {
                debug!(
                    "Conflict patching {} {}, retrying ({}/{})",
                    K::kind(&()),
                    name,
                    attempt,
                    RETRY_STEPS
                );
                attempt += 1;
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Applies `modify` to a fresh copy of `obj` and merge-patches the result,
/// retrying on conflicts. `obj` is updated to the patched state.
pub async fn try_patch<C, K, F>(client: &C, obj: &mut K, mut modify: F) -> Result<(), KubeClientError>
where
    C: KubeClientTrait + ?Sized,
    K: KubeObject,
    F: FnMut(&mut K) + Send,
{
    retry_patch(client, obj, |o| {
        modify(o);
        true
    })
    .await
}

/// Adds finalizers to the live object. Objects already being deleted are
/// left alone, as the API server refuses new finalizers on them.
pub async fn try_add_finalizer<C, K>(client: &C, obj: &mut K, names: &[&str]) -> Result<(), HelperError>
where
    C: KubeClientTrait + ?Sized,
    K: KubeObject,
{
    retry_patch(client, obj, |o| {
        if is_deleting(o) || has_finalizer(o, names) {
            return false;
        }
        add_finalizer(o, names);
        true
    })
    .await
    .map_err(|source| HelperError::AddFinalizer {
        finalizers: names.iter().map(ToString::to_string).collect(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        source,
    })
}

/// Removes finalizers from the live object. An object that is already gone
/// counts as success.
pub async fn try_remove_finalizer<C, K>(
    client: &C,
    obj: &mut K,
    names: &[&str],
) -> Result<(), HelperError>
where
    C: KubeClientTrait + ?Sized,
    K: KubeObject,
{
    let result = retry_patch(client, obj, |o| {
        if !has_any_finalizer(o, names) {
            return false;
        }
        remove_finalizer(o, names);
        true
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            remove_finalizer(obj, names);
            Ok(())
        }
        Err(source) => Err(HelperError::RemoveFinalizer {
            finalizers: names.iter().map(ToString::to_string).collect(),
            kind: K::kind(&()).to_string(),
            name: obj.name_any(),
            source,
        }),
    }
}
