//! HTTP API for health checks, chain status and VAA submission

use crate::chain::{ChainId, Providers};
use crate::config::ApiConfig;
use crate::error::{RelayerError, RelayerResult};
use crate::pipeline::Job;
use crate::relay::{Relayer, VaaEnvelope};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub relayer: Arc<Relayer>,
    pub providers: Arc<Providers>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chains", get(get_chains))
        .route("/vaas", post(submit_vaa))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(
    config: ApiConfig,
    relayer: Arc<Relayer>,
    providers: Arc<Providers>,
) -> RelayerResult<()> {
    let app = router(AppState { relayer, providers });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| RelayerError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        plugins: state.relayer.plugin_names().to_vec(),
    })
}

/// Connected chains with their last health check
async fn get_chains(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.providers.health_check().await;

    Json(ChainsResponse {
        chains: state.providers.connected_chains(),
        health: health
            .into_iter()
            .map(|(chain_id, healthy)| ChainHealth { chain_id, healthy })
            .collect(),
    })
}

/// Run one processing attempt for a submitted VAA
async fn submit_vaa(
    State(state): State<AppState>,
    Json(request): Json<SubmitVaaRequest>,
) -> impl IntoResponse {
    let bytes = match hex::decode(request.payload.trim_start_matches("0x")) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SubmitVaaResponse::rejected(format!("Invalid hex payload: {}", e))),
            )
        }
    };

    let vaa = VaaEnvelope {
        emitter_chain: request.emitter_chain,
        emitter_address: request.emitter_address,
        sequence: request.sequence,
        bytes,
    };

    let mut job = Job::new(request.job_id.unwrap_or_else(|| vaa.id()));
    job.attempts = request.attempts;
    job.max_attempts = request.max_attempts;

    let job_id = job.id.clone();
    let terminal = job.is_terminal();

    match state.relayer.process(job, vaa).await {
        Ok(()) => (
            StatusCode::OK,
            Json(SubmitVaaResponse {
                job_id: Some(job_id),
                status: "succeeded".to_string(),
                terminal: None,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SubmitVaaResponse {
                job_id: Some(job_id),
                status: "failed".to_string(),
                terminal: Some(terminal),
                error: Some(format!("{:#}", anyhow::Error::from(e))),
            }),
        ),
    }
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct SubmitVaaRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    pub emitter_chain: ChainId,
    pub emitter_address: String,
    pub sequence: u64,
    /// Hex-encoded signed VAA
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitVaaResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SubmitVaaResponse {
    fn rejected(error: String) -> Self {
        Self {
            job_id: None,
            status: "rejected".to_string(),
            terminal: None,
            error: Some(error),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    plugins: Vec<String>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: ChainId,
    healthy: bool,
}

#[derive(Serialize)]
struct ChainsResponse {
    chains: Vec<ChainId>,
    health: Vec<ChainHealth>,
}
