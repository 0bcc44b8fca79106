// Integration tests for the sentiment HTTP API, driven in-process.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use sentiment_agent::agent::{SentimentClassifier, SentimentService};
use sentiment_agent::core::{LabelNames, Result, Settings};
use sentiment_agent::pipelines::sentiment::RawSentiment;
use sentiment_agent::server::{build_router, AppState};

/// Everything mentioning "refund" is negative, everything else positive.
struct KeywordClassifier;

impl SentimentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Result<RawSentiment> {
        let label = if text.contains("refund") { "LABEL_0" } else { "LABEL_2" };
        Ok(RawSentiment {
            label: label.into(),
            score: 0.8765,
        })
    }
}

fn app(settings: Settings) -> axum::Router {
    let service = SentimentService::new(KeywordClassifier, settings.max_tokens);
    build_router(AppState::new(service, settings))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_app_and_version() {
    let (status, body) = send(
        app(Settings::default()),
        Request::get("/sentiment/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "app": "Sentiment Analysis API", "version": "1.0.0"})
    );
}

#[tokio::test]
async fn info_describes_model() {
    let (status, body) = send(
        app(Settings::default()),
        Request::get("/sentiment/info").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_name"], "clapAI/modernBERT-base-multilingual-sentiment");
    assert_eq!(body["device"], "auto");
    assert_eq!(body["max_tokens"], 512);
}

#[tokio::test]
async fn predict_returns_label_and_confidence() {
    let (status, body) = send(
        app(Settings::default()),
        post_json("/sentiment/predict", json!({"text": "I want a refund now"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"model_output": "negative", "confidence_score": 87.65}));
}

#[tokio::test]
async fn predict_uses_configured_label_names() {
    let settings = Settings {
        labels: LabelNames {
            negative: "NEG".into(),
            neutral: "NEU".into(),
            positive: "POS".into(),
        },
        ..Settings::default()
    };

    let (_, body) = send(
        app(settings.clone()),
        post_json("/sentiment/predict", json!({"text": "lovely"})),
    )
    .await;
    assert_eq!(body["model_output"], "POS");

    let (_, body) = send(app(settings), post_json("/sentiment/predict", json!({"text": ""}))).await;
    assert_eq!(body, json!({"model_output": "NEU", "confidence_score": 0.0}));
}

#[tokio::test]
async fn batch_preserves_order() {
    let (status, body) = send(
        app(Settings::default()),
        post_json(
            "/sentiment/predict/batch",
            json!({"texts": ["great", "refund please", ""]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["model_output"].as_str().unwrap())
        .collect();
    assert_eq!(labels, ["positive", "negative", "neutral"]);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (status, _) = send(
        app(Settings::default()),
        post_json("/sentiment/predict", json!({"message": "wrong field"})),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn routes_follow_the_configured_prefix() {
    let settings = Settings {
        api_prefix: "/api/v1".into(),
        ..Settings::default()
    };

    let (status, _) = send(
        app(settings.clone()),
        Request::get("/api/v1/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app(settings),
        Request::get("/sentiment/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
