//! HttpRegistry against a fake tracking server / blob store served by axum.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use hitserve_resilience::RetryPolicy;
use inference_gateway::model::decode_artifact;
use inference_gateway::{GatewayError, HttpRegistry, Registry};
use inference_gateway::registry::HttpRegistryOptions;

const NAME: &str = "spotify_model_prod";
const ALIAS: &str = "champion";

#[derive(Clone, Default)]
struct Fake { hits: Arc<AtomicUsize>, metadata: Option<&'static str> }

async fn alias(State(fake): State<Fake>, Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    fake.hits.fetch_add(1, Ordering::SeqCst);
    if q.get("name").map(String::as_str) == Some(NAME) && q.get("alias").map(String::as_str) == Some(ALIAS) {
        (StatusCode::OK, Json(json!({"model_version": {"name": NAME, "version": "7", "source": "mlflow-artifacts:/1/run/artifacts/model"}})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error_code": "RESOURCE_DOES_NOT_EXIST", "message": "no such alias"})))
    }
}

async fn model_json() -> Json<Value> {
    Json(json!({"kind": "linear", "coefficients": [1.0, -2.0, 0.5, 0.25], "intercept": 0.1}))
}

async fn data_json(State(fake): State<Fake>) -> impl IntoResponse {
    match fake.metadata {
        Some(doc) => (StatusCode::OK, doc.to_string()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start(fake: Fake) -> String {
    let app = Router::new()
        .route("/api/2.0/mlflow/registered-models/alias", get(alias))
        .route("/api/2.0/mlflow-artifacts/artifacts/1/run/artifacts/model/model.json", get(model_json))
        .route("/data/data_info/data.json", get(data_json))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    base
}

fn registry(base: &str) -> HttpRegistry {
    HttpRegistry::new(HttpRegistryOptions {
        tracking_uri: base.to_string(),
        blob_url: base.to_string(),
        timeout: Duration::from_millis(500),
        retry: RetryPolicy { attempts: 2, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), jitter: 0.0 },
        breaker_threshold: 2,
        breaker_cooldown: Duration::from_secs(60),
        ..Default::default()
    }).unwrap()
}

#[tokio::test]
async fn resolves_alias_and_loads_model_with_metadata() {
    let base = start(Fake { metadata: Some(r#"{"feature_names":["speechiness","energy","danceability","acousticness"],"date":"2024-05-01"}"#), ..Default::default() }).await;
    let reg = registry(&base);
    assert_eq!(reg.head_version(NAME, ALIAS).await.unwrap(), 7);

    let artifact = reg.load(NAME, ALIAS).await.unwrap();
    assert_eq!(artifact.version, 7);
    assert!(artifact.metadata_json.as_deref().unwrap().contains("2024-05-01"));
    let model = decode_artifact(&artifact.bytes).unwrap();
    assert_eq!(model.kind(), "linear");
    assert!((model.score(&[1.0, 0.0, 0.0, 0.0]) - 1.1).abs() < 1e-9);
}

#[tokio::test]
async fn missing_metadata_is_not_an_error() {
    let base = start(Fake::default()).await;
    let reg = registry(&base);
    let artifact = reg.load(NAME, ALIAS).await.unwrap();
    assert_eq!(artifact.version, 7);
    assert!(artifact.metadata_json.is_none());
    assert_eq!(reg.metadata(NAME, ALIAS).await.unwrap(), None);
}

#[tokio::test]
async fn metadata_is_fetched_on_its_own() {
    let fake = Fake { metadata: Some(r#"{"date":"2024-05-01"}"#), ..Default::default() };
    let base = start(fake.clone()).await;
    let doc = registry(&base).metadata(NAME, ALIAS).await.unwrap();
    assert_eq!(doc.as_deref(), Some(r#"{"date":"2024-05-01"}"#));
    // the blob store is read directly, no alias lookup
    assert_eq!(fake.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_alias_is_not_found_without_retrying() {
    let fake = Fake::default();
    let base = start(fake.clone()).await;
    let err = registry(&base).head_version(NAME, "challenger").await.unwrap_err();
    assert!(matches!(err, GatewayError::ArtifactNotFound { .. }));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_errors_retry_then_open_the_breaker() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move { counter.fetch_add(1, Ordering::SeqCst); StatusCode::SERVICE_UNAVAILABLE }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });

    let reg = registry(&base);
    for _ in 0..2 {
        assert!(matches!(reg.head_version(NAME, ALIAS).await, Err(GatewayError::RegistryUnavailable(_))));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    // breaker open: fails fast without another request
    assert!(matches!(reg.load(NAME, ALIAS).await, Err(GatewayError::RegistryUnavailable(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn closed_port_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    assert!(matches!(registry(&base).head_version(NAME, ALIAS).await, Err(GatewayError::RegistryUnavailable(_))));
}
