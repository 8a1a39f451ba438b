//! Prometheus metrics and the HTTP endpoint serving them.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Metrics of the deletion controller, kept in their own registry.
#[derive(Debug, Clone)]
pub struct DeletionMetrics {
    registry: Registry,
    stale_lbs: GaugeVec,
}

impl DeletionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let stale_lbs = GaugeVec::new(
            Opts::new(
                "kubermatic_cluster_deletion_stale_lbs",
                "Number of deleted LoadBalancers for which no deletion event was seen before giving up",
            ),
            &["cluster"],
        )?;
        registry.register(Box::new(stale_lbs.clone()))?;

        Ok(Self {
            registry,
            stale_lbs,
        })
    }

    pub fn set_stale_lbs(&self, cluster: &str, count: usize) {
        #[allow(clippy::cast_precision_loss, reason = "counts stay far below 2^52")]
        self.stale_lbs
            .with_label_values(&[cluster])
            .set(count as f64);
    }

    #[cfg(test)]
    pub fn stale_lbs(&self, cluster: &str) -> f64 {
        self.stale_lbs.with_label_values(&[cluster]).get()
    }

    /// Text exposition of all registered metrics.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

async fn metrics_handler(State(metrics): State<DeletionMetrics>) -> (StatusCode, String) {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(metrics: DeletionMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serves `/metrics` and `/healthz` until the process exits.
pub async fn serve(addr: SocketAddr, metrics: DeletionMetrics) -> Result<(), ControllerError> {
    info!("Metrics server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, router(metrics))
        .await
        .map_err(|e| ControllerError::Metrics(format!("Server error: {}", e)))
}
