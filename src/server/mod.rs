//! HTTP front end for the sentiment service.
//!
//! ```text
//! GET  {prefix}/health
//! GET  {prefix}/info
//! POST {prefix}/predict        {"text": "..."}
//! POST {prefix}/predict/batch  {"texts": ["...", ...]}
//! ```
//!
//! Predictions are reported with the configured label names.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::agent::{Prediction, SentimentClassifier, SentimentService};
use crate::core::{AgentError, Result, Settings};

/// Router state shared by every handler.
pub struct AppState<C> {
    pub service: Arc<SentimentService<C>>,
    pub settings: Arc<Settings>,
}

// Manual impl: cloning only bumps the Arcs, whatever `C` is.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<C> AppState<C> {
    pub fn new(service: SentimentService<C>, settings: Settings) -> Self {
        Self {
            service: Arc::new(service),
            settings: Arc::new(settings),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub model_output: String,
    pub confidence_score: f64,
}

impl PredictResponse {
    fn from_prediction(prediction: Prediction, settings: &Settings) -> Self {
        Self {
            model_output: prediction
                .model_output
                .display_name(&settings.labels)
                .to_string(),
            confidence_score: prediction.confidence_score,
        }
    }
}

fn internal_error(msg: impl std::fmt::Display) -> Response {
    error!("request failed: {msg}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal", "message": format!("{msg}") })),
    )
        .into_response()
}

/// GET {prefix}/health
async fn health<C>(State(state): State<AppState<C>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "app": state.settings.app_name,
        "version": state.settings.version,
    }))
}

/// GET {prefix}/info
async fn info_route<C>(State(state): State<AppState<C>>) -> Json<serde_json::Value> {
    let s = &state.settings;
    Json(json!({
        "app": s.app_name,
        "description": s.description,
        "version": s.version,
        "model_name": s.model_name,
        "device": s.device.as_str(),
        "max_tokens": s.max_tokens,
    }))
}

/// POST {prefix}/predict
async fn predict<C>(State(state): State<AppState<C>>, Json(req): Json<PredictRequest>) -> Response
where
    C: SentimentClassifier + Send + Sync + 'static,
{
    let service = Arc::clone(&state.service);
    // Inference is CPU/GPU bound; keep it off the async workers.
    match tokio::task::spawn_blocking(move || service.predict(&req.text)).await {
        Ok(prediction) => {
            Json(PredictResponse::from_prediction(prediction, &state.settings)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// POST {prefix}/predict/batch
async fn predict_batch<C>(State(state): State<AppState<C>>, Json(req): Json<BatchRequest>) -> Response
where
    C: SentimentClassifier + Send + Sync + 'static,
{
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.predict_batch(&req.texts)).await {
        Ok(predictions) => {
            let body: Vec<PredictResponse> = predictions
                .into_iter()
                .map(|p| PredictResponse::from_prediction(p, &state.settings))
                .collect();
            Json(body).into_response()
        }
        Err(e) => internal_error(e),
    }
}

pub fn build_router<C>(state: AppState<C>) -> Router
where
    C: SentimentClassifier + Send + Sync + 'static,
{
    let prefix = state.settings.api_prefix.clone();
    let api = Router::new()
        .route("/health", get(health::<C>))
        .route("/info", get(info_route::<C>))
        .route("/predict", post(predict::<C>))
        .route("/predict/batch", post(predict_batch::<C>))
        .with_state(state);

    Router::new().nest(&prefix, api)
}

/// Bind `bind_addr` and serve until Ctrl-C.
pub async fn serve<C>(state: AppState<C>, bind_addr: &str) -> Result<()>
where
    C: SentimentClassifier + Send + Sync + 'static,
{
    let prefix = state.settings.api_prefix.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AgentError::Http(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, %prefix, "sentiment API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| AgentError::Http(format!("server error: {e}")))?;

    info!("sentiment API shut down");
    Ok(())
}
