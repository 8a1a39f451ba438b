//! Kubernetes API client
//!
//! Implements `KubeClientTrait` over a `kube::Client`. Every call goes through
//! an `Api<DynamicObject>` built from the static type information of the
//! requested kind, which lets one code path serve namespaced and
//! cluster-scoped kinds alike.

use crate::client_trait::{DeletePropagation, KubeClientTrait, KubeObject, ListOptions};
use crate::error::KubeClientError;
use crate::patch::{create_merge_patch, is_empty_patch};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
    PropagationPolicy,
};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use tracing::debug;

/// Message the API server returns for a 404 on a resource type it does not serve.
const NO_MATCH_MESSAGE: &str = "the server could not find the requested resource";

#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the in-cluster service account or the local kubeconfig.
    pub async fn try_default() -> Result<Self, KubeClientError> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn api<K: KubeObject>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::erase::<K>(&());
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn to_dynamic<K: KubeObject>(obj: &K) -> Result<DynamicObject, KubeClientError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn from_dynamic<K: KubeObject>(obj: DynamicObject) -> Result<K, KubeClientError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Classifies an API error for the object `name` of kind `K`.
fn classify<K: KubeObject>(err: kube::Error, name: &str) -> KubeClientError {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(response) => {
            let code = response.code;
            let reason = response.reason.to_string();
            let message = response.message.to_string();
            match code {
                404 if message.contains(NO_MATCH_MESSAGE) => KubeClientError::NoMatch { kind },
                404 => KubeClientError::NotFound {
                    kind,
                    name: name.to_string(),
                },
                409 if reason == "AlreadyExists" => KubeClientError::AlreadyExists {
                    kind,
                    name: name.to_string(),
                },
                409 => KubeClientError::Conflict {
                    kind,
                    name: name.to_string(),
                    message,
                },
                _ if message.contains("no matches for kind") => KubeClientError::NoMatch { kind },
                _ => KubeClientError::Api {
                    code,
                    reason,
                    message,
                },
            }
        }
        other => KubeClientError::Kube(other),
    }
}

fn delete_params(propagation: Option<DeletePropagation>) -> DeleteParams {
    DeleteParams {
        propagation_policy: propagation.map(|p| match p {
            DeletePropagation::Background => PropagationPolicy::Background,
            DeletePropagation::Foreground => PropagationPolicy::Foreground,
            DeletePropagation::Orphan => PropagationPolicy::Orphan,
        }),
        ..Default::default()
    }
}

fn list_params(options: &ListOptions) -> ListParams {
    let mut params = ListParams::default();
    if let Some(labels) = &options.label_selector {
        params = params.labels(labels);
    }
    if let Some(fields) = &options.field_selector {
        params = params.fields(fields);
    }
    params
}

/// Diff of `old` and `new`, carrying the resource version of `old`.
///
/// Returns `None` when there is nothing to change.
pub(crate) fn optimistic_patch<K: KubeObject>(
    old: &K,
    new: &K,
    status_only: bool,
) -> Result<Option<Value>, KubeClientError> {
    let old_value = serde_json::to_value(old)?;
    let new_value = serde_json::to_value(new)?;
    let mut patch = create_merge_patch(&old_value, &new_value);

    if status_only {
        patch = match patch.get("status") {
            Some(status) => json!({ "status": status }),
            None => json!({}),
        };
    }
    if is_empty_patch(&patch) {
        return Ok(None);
    }

    if let Some(resource_version) = old.meta().resource_version.as_deref() {
        if let Value::Object(map) = &mut patch {
            let metadata = map
                .entry("metadata")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(metadata) = metadata {
                metadata.insert(
                    "resourceVersion".to_string(),
                    Value::String(resource_version.to_string()),
                );
            }
        }
    }

    Ok(Some(patch))
}

#[async_trait::async_trait]
impl KubeClientTrait for KubeClient {
    async fn get<K: KubeObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, KubeClientError> {
        let obj = self
            .api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| classify::<K>(e, name))?;
        from_dynamic(obj)
    }

    async fn list<K: KubeObject>(&self, options: &ListOptions) -> Result<Vec<K>, KubeClientError> {
        let list = self
            .api::<K>(options.namespace.as_deref())
            .list(&list_params(options))
            .await
            .map_err(|e| classify::<K>(e, ""))?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn create<K: KubeObject>(&self, obj: &K) -> Result<K, KubeClientError> {
        let name = obj.name_any();
        debug!("Creating {} {}", K::kind(&()), name);
        let created = self
            .api::<K>(obj.meta().namespace.as_deref())
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify::<K>(e, &name))?;
        from_dynamic(created)
    }

    async fn delete<K: KubeObject>(
        &self,
        obj: &K,
        propagation: Option<DeletePropagation>,
    ) -> Result<(), KubeClientError> {
        let name = obj.name_any();
        debug!("Deleting {} {}", K::kind(&()), name);
        self.api::<K>(obj.meta().namespace.as_deref())
            .delete(&name, &delete_params(propagation))
            .await
            .map_err(|e| classify::<K>(e, &name))?;
        Ok(())
    }

    async fn delete_all_of<K: KubeObject>(&self, options: &ListOptions) -> Result<(), KubeClientError> {
        debug!(
            "Deleting all {} in {}",
            K::kind(&()),
            options.namespace.as_deref().unwrap_or("all namespaces")
        );
        self.api::<K>(options.namespace.as_deref())
            .delete_collection(&DeleteParams::default(), &list_params(options))
            .await
            .map_err(|e| classify::<K>(e, ""))?;
        Ok(())
    }

    async fn patch<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError> {
        let Some(patch) = optimistic_patch(old, new, false)? else {
            return Ok(new.clone());
        };
        let name = old.name_any();
        let patched = self
            .api::<K>(old.meta().namespace.as_deref())
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify::<K>(e, &name))?;
        from_dynamic(patched)
    }

    async fn patch_status<K: KubeObject>(&self, old: &K, new: &K) -> Result<K, KubeClientError> {
        let Some(patch) = optimistic_patch(old, new, true)? else {
            return Ok(new.clone());
        };
        let name = old.name_any();
        let patched = self
            .api::<K>(old.meta().namespace.as_deref())
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify::<K>(e, &name))?;
        from_dynamic(patched)
    }
}
