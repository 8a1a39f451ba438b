//! Cluster Deletion Controller
//!
//! Tears down user clusters once their Cluster object is deleted: in-cluster
//! LoadBalancers and volumes first, then machines, then the seed namespace
//! and finally the cloud credentials. Each step is tracked by a finalizer on
//! the Cluster.

mod controller;
mod deletion;
mod error;
mod metrics;
mod reconciler;
mod user_cluster;
mod watcher;

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;

use crate::controller::{Config, Controller};
use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8085";
const DEFAULT_KUBERMATIC_NAMESPACE: &str = "kubermatic";
const DEFAULT_CONCURRENCY: u16 = 3;

fn load_config() -> Result<Config, ControllerError> {
    let metrics_addr: SocketAddr = env::var("METRICS_ADDR")
        .unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string())
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("METRICS_ADDR: {}", e)))?;
    let kubermatic_namespace = env::var("KUBERMATIC_NAMESPACE")
        .unwrap_or_else(|_| DEFAULT_KUBERMATIC_NAMESPACE.to_string());
    let concurrency = match env::var("RECONCILE_CONCURRENCY") {
        Ok(value) => value
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("RECONCILE_CONCURRENCY: {}", e)))?,
        Err(_) => DEFAULT_CONCURRENCY,
    };

    Ok(Config {
        metrics_addr,
        kubermatic_namespace,
        concurrency,
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

    info!("Starting Cluster Deletion Controller");

    let config = load_config()?;
    info!("Configuration:");
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  Kubermatic namespace: {}", config.kubermatic_namespace);
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
