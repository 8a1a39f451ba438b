//! Etcd Backup Controller
//!
//! Takes etcd snapshots of user clusters on the schedule given by each
//! EtcdBackupConfig, uploads them through a store container and prunes old
//! backups through a delete container. Deleted configs keep a finalizer until
//! all of their backups are gone from the store.

mod config;
mod controller;
mod error;
mod jobs;
mod naming;
mod reconciler;
mod schedule;
mod watcher;


use crate::config::{
    container_from_yaml, destinations_from_yaml, read_file, BackupSettings, DEFAULT_BACKUP_IMAGE,
    DEFAULT_DELETE_CONTAINER, DEFAULT_STORE_CONTAINER,
};
use crate::controller::{Config, Controller};
use crate::error::ControllerError;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONCURRENCY: u16 = 3;

/// Contents of the file named by `var`, or `default` when it is unset.
fn file_or_default(var: &str, default: &str) -> Result<String, ControllerError> {
    match env::var(var) {
        Ok(path) if !path.is_empty() => Ok(read_file(Path::new(&path))?),
        _ => Ok(default.to_string()),
    }
}

fn load_config() -> Result<Config, ControllerError> {
    let backup_image = env::var("ETCD_BACKUP_IMAGE")
        .ok()
        .filter(|image| !image.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKUP_IMAGE.to_string());

    let store_container = container_from_yaml(&file_or_default("BACKUP_STORE_CONTAINER", DEFAULT_STORE_CONTAINER)?)?
        .ok_or_else(|| ControllerError::InvalidConfig("BACKUP_STORE_CONTAINER: file is empty".to_string()))?;
    let delete_container =
        container_from_yaml(&file_or_default("BACKUP_DELETE_CONTAINER", DEFAULT_DELETE_CONTAINER)?)?;
    let destinations = match env::var("BACKUP_DESTINATIONS_FILE") {
        Ok(path) if !path.is_empty() => destinations_from_yaml(&read_file(Path::new(&path))?)?,
        _ => BTreeMap::new(),
    };

    let ca_bundle = match env::var("CA_BUNDLE_FILE") {
        Ok(path) if !path.is_empty() => read_file(Path::new(&path))?,
        _ => return Err(ControllerError::InvalidConfig("CA_BUNDLE_FILE must be set".to_string())),
    };

    let concurrency = match env::var("RECONCILE_CONCURRENCY") {
        Ok(value) => value
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("RECONCILE_CONCURRENCY: {}", e)))?,
        Err(_) => DEFAULT_CONCURRENCY,
    };

    Ok(Config {
        concurrency,
        backup: BackupSettings {
            backup_image,
            store_container,
            delete_container,
            destinations,
            ca_bundle,
        },
    })
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    info!("Starting Etcd Backup Controller");

    let config = load_config()?;
    info!("Configuration:");
    info!("  Backup image: {}", config.backup.backup_image);
    info!("  Store container: {}", config.backup.store_container.name);
    match &config.backup.delete_container {
        Some(container) => info!("  Delete container: {}", container.name),
        None => info!("  Delete container: none, backups are not deleted from the store"),
    }
    info!(
        "  Destinations: {}",
        config.backup.destinations.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    info!("  CA bundle: {} bytes", config.backup.ca_bundle.len());
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
