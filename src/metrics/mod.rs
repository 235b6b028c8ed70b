//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - VAAs picked up for processing
//! - Finished attempts by status and terminal outcome
//! - Processing latency
//!
//! Metrics live in an explicit [`prometheus::Registry`] created at startup
//! and shared between the pipeline and the `/metrics` endpoint.

mod middleware;

pub use middleware::{
    LabelCustomizer, LabelOptions, LabelValue, MetricLabels, MetricsMiddleware, MetricsOptions,
    DEFAULT_PROCESSING_TIME_BUCKETS, FINISHED_TOTAL, PROCESSED_TOTAL, PROCESSING_DURATION,
    STATUS_LABEL, TERMINAL_LABEL,
};

use crate::error::{RelayerError, RelayerResult};

use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{error, info};

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
    registry: Registry,
}

impl MetricsServer {
    pub fn new(port: u16, registry: Registry) -> Self {
        Self { port, registry }
    }

    pub async fn run(&self) -> RelayerResult<()> {
        let app = router(self.registry.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RelayerError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

/// Router serving `/metrics` from `registry`
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Encode all metrics of `registry` in the text exposition format
pub fn encode(registry: &Registry) -> RelayerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| RelayerError::Internal(e.to_string()))
}

async fn metrics_handler(State(registry): State<Registry>) -> Result<String, StatusCode> {
    encode(&registry).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
