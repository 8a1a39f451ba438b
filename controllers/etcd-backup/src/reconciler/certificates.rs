//! Credentials the backup jobs mount: an etcd client certificate signed by
//! the cluster root CA, and the CA bundle for the object store. Both live
//! next to the jobs in `kube-system` and are owned by the Cluster.

use super::Reconciler;
use crate::error::{BackupError, ResultExt};
use crate::jobs::{
    ca_bundle_config_map_name, etcd_client_secret_name, CA_BUNDLE_CONFIG_MAP_KEY,
    CA_CERT_SECRET_KEY, CLIENT_CERT_SECRET_KEY, CLIENT_KEY_SECRET_KEY, JOB_NAMESPACE,
};
use chrono::{DateTime, Datelike, Duration, Utc};
use crds::Cluster;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::Resource;
use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose};
use resource_client::{ignore_not_found, KubeClientTrait};
use std::collections::BTreeMap;
use tracing::info;

/// Secret in the cluster namespace holding the cluster root CA.
pub(crate) const CLUSTER_CA_SECRET_NAME: &str = "ca";
pub(crate) const CLUSTER_CA_CERT_KEY: &str = "ca.crt";
pub(crate) const CLUSTER_CA_KEY_KEY: &str = "ca.key";

pub(crate) const CLIENT_COMMON_NAME: &str = "backup";
const CLIENT_CERT_VALIDITY_YEARS: i32 = 10;
/// Certificates closer than this to their expiry are reissued.
const MINIMUM_CERT_VALIDITY: Duration = Duration::days(30);

struct ClusterCa {
    cert_pem: String,
    key_pem: String,
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    let value = secret.data.as_ref()?.get(key)?;
    String::from_utf8(value.0.clone()).ok()
}

/// Issues a client certificate for `CLIENT_COMMON_NAME` signed by `ca`.
/// Returns the certificate and its private key as PEM.
fn issue_client_certificate(ca: &ClusterCa, now: DateTime<Utc>) -> Result<(String, String), rcgen::Error> {
    let ca_key = KeyPair::from_pem(&ca.key_pem)?;
    let ca_cert = CertificateParams::from_ca_cert_pem(&ca.cert_pem)?.self_signed(&ca_key)?;

    let mut params = CertificateParams::new(Vec::<String>::new())?;
    params
        .distinguished_name
        .push(DnType::CommonName, CLIENT_COMMON_NAME);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let (month, day) = (
        u8::try_from(now.month()).unwrap_or(1),
        u8::try_from(now.day().min(28)).unwrap_or(1),
    );
    params.not_before = rcgen::date_time_ymd(now.year(), month, day);
    params.not_after = rcgen::date_time_ymd(now.year() + CLIENT_CERT_VALIDITY_YEARS, month, day);

    let key = KeyPair::generate()?;
    let cert = params.signed_by(&key, &ca_cert, &ca_key)?;
    Ok((cert.pem(), key.serialize_pem()))
}

/// Whether `secret` holds a certificate issued by `ca` that is not about to expire.
fn client_certificate_is_current(secret: &Secret, ca: &ClusterCa, now: DateTime<Utc>) -> bool {
    let Some(stored_ca) = secret_value(secret, CA_CERT_SECRET_KEY) else {
        return false;
    };
    if stored_ca.trim() != ca.cert_pem.trim() || secret_value(secret, CLIENT_KEY_SECRET_KEY).is_none() {
        return false;
    }
    let Some(cert_pem) = secret_value(secret, CLIENT_CERT_SECRET_KEY) else {
        return false;
    };
    match CertificateParams::from_ca_cert_pem(&cert_pem) {
        Ok(params) => params.not_after.unix_timestamp() > (now + MINIMUM_CERT_VALIDITY).timestamp(),
        Err(_) => false,
    }
}

impl<C: KubeClientTrait + 'static> Reconciler<C> {
    /// Makes sure the etcd client certificate secret exists and is signed by
    /// the current cluster root CA.
    pub(super) async fn ensure_secrets(&self, cluster: &Cluster) -> Result<(), BackupError> {
        let name = etcd_client_secret_name(cluster);
        let ca = self.cluster_ca(cluster).await?;
        let now = self.clock.now();

        let existing: Option<Secret> = ignore_not_found(self.client.get(Some(JOB_NAMESPACE), &name).await)
            .context(format!("failed to get secret {name}"))?;
        if let Some(secret) = &existing {
            if client_certificate_is_current(secret, &ca, now) {
                return Ok(());
            }
        }

        let (cert_pem, key_pem) = issue_client_certificate(&ca, now)?;
        let data = BTreeMap::from([
            (CA_CERT_SECRET_KEY.to_string(), ByteString(ca.cert_pem.into_bytes())),
            (CLIENT_CERT_SECRET_KEY.to_string(), ByteString(cert_pem.into_bytes())),
            (CLIENT_KEY_SECRET_KEY.to_string(), ByteString(key_pem.into_bytes())),
        ]);

        match existing {
            Some(old) => {
                info!("Renewing etcd client certificate {}", name);
                let mut secret = old.clone();
                secret.data = Some(data);
                secret.metadata.owner_references = cluster.controller_owner_ref(&()).map(|owner| vec![owner]);
                self.client
                    .patch(&old, &secret)
                    .await
                    .context(format!("failed to update secret {name}"))?;
            }
            None => {
                info!("Creating etcd client certificate {}", name);
                let secret = Secret {
                    metadata: owned_metadata(cluster, &name),
                    data: Some(data),
                    ..Default::default()
                };
                self.client
                    .create(&secret)
                    .await
                    .context(format!("failed to create secret {name}"))?;
            }
        }
        Ok(())
    }

    /// Makes sure the CA bundle config map holds the configured bundle.
    pub(super) async fn ensure_config_maps(&self, cluster: &Cluster) -> Result<(), BackupError> {
        let name = ca_bundle_config_map_name(cluster);
        let data = BTreeMap::from([(
            CA_BUNDLE_CONFIG_MAP_KEY.to_string(),
            self.settings.ca_bundle.clone(),
        )]);

        let existing: Option<ConfigMap> = ignore_not_found(self.client.get(Some(JOB_NAMESPACE), &name).await)
            .context(format!("failed to get config map {name}"))?;
        match existing {
            Some(old) => {
                let owner = cluster.controller_owner_ref(&()).map(|owner| vec![owner]);
                if old.data.as_ref() == Some(&data) && old.metadata.owner_references == owner {
                    return Ok(());
                }
                let mut config_map = old.clone();
                config_map.data = Some(data);
                config_map.metadata.owner_references = owner;
                self.client
                    .patch(&old, &config_map)
                    .await
                    .context(format!("failed to update config map {name}"))?;
            }
            None => {
                let config_map = ConfigMap {
                    metadata: owned_metadata(cluster, &name),
                    data: Some(data),
                    ..Default::default()
                };
                self.client
                    .create(&config_map)
                    .await
                    .context(format!("failed to create config map {name}"))?;
            }
        }
        Ok(())
    }

    async fn cluster_ca(&self, cluster: &Cluster) -> Result<ClusterCa, BackupError> {
        let namespace = cluster.namespace_name();
        let secret: Secret = self
            .client
            .get(Some(namespace), CLUSTER_CA_SECRET_NAME)
            .await
            .context(format!("failed to get cluster CA from namespace {namespace}"))?;
        let missing = |key| BackupError::MissingCaKey {
            secret: format!("{namespace}/{CLUSTER_CA_SECRET_NAME}"),
            key,
        };
        Ok(ClusterCa {
            cert_pem: secret_value(&secret, CLUSTER_CA_CERT_KEY).ok_or_else(|| missing(CLUSTER_CA_CERT_KEY))?,
            key_pem: secret_value(&secret, CLUSTER_CA_KEY_KEY).ok_or_else(|| missing(CLUSTER_CA_KEY_KEY))?,
        })
    }
}

fn owned_metadata(cluster: &Cluster, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(JOB_NAMESPACE.to_string()),
        owner_references: cluster.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}
