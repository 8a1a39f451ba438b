//! Backup settings of the seed: the etcd image, the containers uploading and
//! deleting backups, and the storage destinations.

use k8s_openapi::api::core::v1::{Container, SecretReference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image providing `etcdctl`. A tag is added when none is given.
pub const DEFAULT_BACKUP_IMAGE: &str = "gcr.io/etcd-development/etcd";
pub const DEFAULT_ETCD_IMAGE_TAG: &str = "v3.4.3";

pub const DEFAULT_STORE_CONTAINER: &str = r#"
name: store-container
image: d3fk/s3cmd@sha256:2061883abbf0ebcf0ea3d5d218558c9c229f212e9c08af4acdaa3758980eb67a
command:
- /bin/sh
- -c
- |
  set -e

  SSL_FLAGS="--ca-certs=/etc/ca-bundle/ca-bundle.pem"
  if [ "${INSECURE:-false}" == "true" ]; then
    SSL_FLAGS="--no-ssl"
  fi

  s3cmd $SSL_FLAGS \
    --access_key=$ACCESS_KEY_ID \
    --secret_key=$SECRET_ACCESS_KEY \
    --host=$ENDPOINT \
    --host-bucket='%(bucket).'$ENDPOINT \
    put /backup/snapshot.db s3://$BUCKET_NAME/$CLUSTER-$BACKUP_TO_CREATE
volumeMounts:
- name: etcd-backup
  mountPath: /backup
"#;

pub const DEFAULT_DELETE_CONTAINER: &str = r#"
name: delete-container
image: d3fk/s3cmd@sha256:2061883abbf0ebcf0ea3d5d218558c9c229f212e9c08af4acdaa3758980eb67a
command:
- /bin/sh
- -c
- |
  SSL_FLAGS="--ca-certs=/etc/ca-bundle/ca-bundle.pem"
  if [ "${INSECURE:-false}" == "true" ]; then
    SSL_FLAGS="--no-ssl"
  fi

  s3cmd $SSL_FLAGS \
    --access_key=$ACCESS_KEY_ID \
    --secret_key=$SECRET_ACCESS_KEY \
    --host=$ENDPOINT \
    --host-bucket='%(bucket).'$ENDPOINT \
    del s3://$BUCKET_NAME/$CLUSTER-$BACKUP_TO_DELETE

  case $? in
  12)
    # backup no longer exists
    exit 0
    ;;
  0)
    exit 0
    ;;
  *)
    exit $?
    ;;
  esac
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("container must have a name")]
    MissingContainerName,

    #[error("container must have an image")]
    MissingContainerImage,
}

/// Object storage that backups are uploaded to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDestination {
    pub endpoint: String,
    pub bucket_name: String,
    /// Secret with the `ACCESS_KEY_ID` and `SECRET_ACCESS_KEY` keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SecretReference>,
}

impl BackupDestination {
    /// Only plain `http://host` endpoints are insecure. `http:9000` is a
    /// port-only address, not an HTTP URL.
    pub fn is_insecure(&self) -> bool {
        let Some((scheme, rest)) = self.endpoint.split_once("://") else {
            return false;
        };
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        scheme.eq_ignore_ascii_case("http") && !host.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_image: String,
    pub store_container: Container,
    /// Without a delete container, backups are forgotten instead of deleted.
    pub delete_container: Option<Container>,
    pub destinations: BTreeMap<String, BackupDestination>,
    /// PEM bundle the store and delete containers trust for the object store.
    pub ca_bundle: String,
}

impl BackupSettings {
    pub fn destination(&self, name: &str) -> Option<&BackupDestination> {
        self.destinations.get(name)
    }
}

/// Parses a container from YAML. Blank input means "no container".
pub fn container_from_yaml(yaml: &str) -> Result<Option<Container>, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(None);
    }
    let container: Container = serde_yaml::from_str(yaml)?;
    if container.name.is_empty() {
        return Err(ConfigError::MissingContainerName);
    }
    if container.image.as_deref().is_none_or(str::is_empty) {
        return Err(ConfigError::MissingContainerImage);
    }
    Ok(Some(container))
}

/// Parses a `name -> destination` map.
pub fn destinations_from_yaml(yaml: &str) -> Result<BTreeMap<String, BackupDestination>, ConfigError> {
    if yaml.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_yaml::from_str(yaml)?)
}

pub fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
