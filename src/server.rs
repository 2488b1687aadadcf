//! HTTP inference service for 24 h failure probabilities.
//!
//! This module provides an HTTP server that:
//! - Accepts a named feature mapping via POST /predict_24h
//! - Scores it with the configured [`FailureClassifier`]
//! - Returns the probability and a tiered maintenance recommendation
//!
//! # Architecture
//!
//! ```text
//! client ──→ POST /predict_24h ──→ score() ──→ classifier
//!                                      ↓
//!                          {probability, recommendation}
//! ```

use crate::model::{score, FailureClassifier, Prediction, ScoringError};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Number of feature names shown by `/sample_payload`.
const SAMPLE_FEATURES: usize = 10;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Classifier used to score requests
    pub model: Arc<dyn FailureClassifier>,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, model: Arc<dyn FailureClassifier>) -> Self {
        Self { port, model }
    }
}

/// Shared server state
pub struct ServerState {
    model: Arc<dyn FailureClassifier>,
}

/// Inference request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub features: HashMap<String, f64>,
}

/// Response from the root endpoint
#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
    pub model_features_count: usize,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Example request body
#[derive(Serialize)]
pub struct SamplePayloadResponse {
    pub note: String,
    pub features_example: BTreeMap<String, f64>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl From<ScoringError> for ErrorResponse {
    fn from(err: ScoringError) -> Self {
        let error = err.to_string();
        match err {
            ScoringError::MissingFeatures(missing) => ErrorResponse {
                error,
                code: "MISSING_FEATURES".to_string(),
                missing,
            },
            ScoringError::NonFinite(_) => ErrorResponse {
                error,
                code: "INVALID_FEATURE".to_string(),
                missing: Vec::new(),
            },
        }
    }
}

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        ErrorResponse {
            error: rejection.body_text(),
            code: "MALFORMED_REQUEST".to_string(),
            missing: Vec::new(),
        }
    }
}

/// GET /
async fn root(State(state): State<Arc<ServerState>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Predictive maintenance API is running.".to_string(),
        model_features_count: state.model.feature_names().len(),
    })
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /sample_payload
async fn sample_payload(State(state): State<Arc<ServerState>>) -> Json<SamplePayloadResponse> {
    let features_example = state
        .model
        .feature_names()
        .iter()
        .take(SAMPLE_FEATURES)
        .map(|name| (name.clone(), 0.0))
        .collect();

    Json(SamplePayloadResponse {
        note: "Use these feature keys in the 'features' map when POSTing to /predict_24h; every model feature is required.".to_string(),
        features_example,
    })
}

/// POST /predict_24h
///
/// Every feature the model was trained on must be present. Missing keys are
/// rejected rather than filled with defaults.
async fn predict_24h(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Malformed prediction request: {}", rejection.body_text());
        (rejection.status(), Json(ErrorResponse::from(rejection)))
    })?;
    match score(state.model.as_ref(), &request.features) {
        Ok(prediction) => {
            tracing::debug!(
                probability = prediction.failure_probability_24h,
                "Scored request"
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            tracing::warn!("Rejected prediction request: {}", e);
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(e.into())))
        }
    }
}

/// Build the router without binding it.
pub fn router(model: Arc<dyn FailureClassifier>) -> Router {
    let state = Arc::new(ServerState { model });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/sample_payload", get(sample_payload))
        .route("/predict_24h", post(predict_24h))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: ServerConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let features = config.model.feature_names().len();
    let app = router(config.model);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!(
        features,
        "Inference server listening on http://{}",
        actual_addr
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
