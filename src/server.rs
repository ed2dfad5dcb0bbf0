use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::Variant;
use crate::error::HarnessResult;
use crate::io::{
    read_duration, read_features, write_prediction, HealthResponse, LoadParams, LoadResponse,
    PredictResponse,
};
use crate::model::LoadModel;
use crate::telemetry::{device_memory, CpuSampler};

/// Application context built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<LoadModel>,
    pub cpu: Arc<CpuSampler>,
    pub pod_name: Arc<str>,
}

impl AppState {
    pub fn new(model: LoadModel, pod_name: impl Into<Arc<str>>) -> Self {
        Self {
            model: Arc::new(model),
            cpu: Arc::new(CpuSampler::new()),
            pod_name: pod_name.into(),
        }
    }
}

/// Build the harness router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/load", get(generate_load))
        .with_state(state)
}

/// Runs the HTTP server until `shutdown` resolves.
///
/// # Arguments
///
/// * `addr` - The address to bind to.
/// * `state` - The application context holding the loaded model.
/// * `shutdown` - Future that completes when the server should stop accepting
///   connections.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, variant = ?state.model.variant(), "serving");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let memory = device_memory(state.model.device());
    Json(HealthResponse {
        status: "healthy".to_string(),
        cpu_percent: state.cpu.sample(),
        gpu_memory_free_bytes: memory.map(|m| m.free_bytes),
        gpu_memory_total_bytes: memory.map(|m| m.total_bytes),
    })
}

/// POST /predict
async fn predict(State(state): State<AppState>, body: Bytes) -> HarnessResult<Json<PredictResponse>> {
    let input = read_features(&body, &candle_core::Device::Cpu)?;
    let model = Arc::clone(&state.model);
    let prediction = tokio::task::spawn_blocking(move || {
        let output = model.predict(&input)?;
        write_prediction(&output)
    })
    .await??;
    debug!("prediction served");
    Ok(Json(PredictResponse {
        prediction,
        status: "success".to_string(),
        pod_name: state.pod_name.to_string(),
    }))
}

/// GET /load
async fn generate_load(
    State(state): State<AppState>,
    Query(params): Query<LoadParams>,
) -> HarnessResult<Json<LoadResponse>> {
    let secs = read_duration(&params)?;
    let variant = state.model.variant();
    info!(duration_secs = secs, ?variant, "generating load");
    let model = Arc::clone(&state.model);
    let report =
        tokio::task::spawn_blocking(move || model.generate_load(Duration::from_secs(secs)))
            .await??;
    info!(duration_secs = secs, iters = ?report.iters, "load finished");
    let message = match variant {
        Variant::Cpu => format!("Generated load for {secs} seconds"),
        Variant::Accelerator => format!("Generated GPU load for {secs} seconds"),
    };
    Ok(Json(LoadResponse {
        message,
        iters: report.iters,
        pod_name: state.pod_name.to_string(),
    }))
}
