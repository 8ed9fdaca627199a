//! Core shared utilities for hitserve services: tracing, layered config, health + metrics endpoints.

use anyhow::Result;
use tracing::info;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use axum::{routing::get, Router, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{prelude::*, EnvFilter};

pub mod config_loader;
pub use config_loader::{config_builder, config_version, record_config_version, ENV_PREFIX};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);
// Extra fields merged into /status (e.g. the served model version).
static STATUS_FIELDS: Lazy<RwLock<serde_json::Map<String, serde_json::Value>>> = Lazy::new(|| RwLock::new(serde_json::Map::new()));

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }

pub fn set_status_field(key: &str, value: impl Into<serde_json::Value>) {
    STATUS_FIELDS.write().insert(key.to_string(), value.into());
}

/// Installs the global subscriber once per process. `HITSERVE_JSON_LOG=1` switches to JSON lines;
/// `RUST_LOG` drives filtering and defaults to `info`.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("HITSERVE_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let json_layer = json.then(|| tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false));
        let text_layer = (!json).then(|| tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true));
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "hitserve", service, "tracing initialized");
    Ok(())
}

pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": NODE_LIVENESS.load(Ordering::SeqCst)})) }))
        .route("/ready", get(ready_handler))
        .route("/status", get(|| async {
            let mut body = serde_json::Map::new();
            body.insert("live".into(), NODE_LIVENESS.load(Ordering::SeqCst).into());
            body.insert("ready".into(), is_ready().into());
            body.insert("config_version".into(), config_version().into());
            for (k, v) in STATUS_FIELDS.read().iter() { body.insert(k.clone(), v.clone()); }
            axum::Json(serde_json::Value::Object(body))
        }))
        .route("/metrics", get(metrics_handler))
}

/// Binds the health listener and serves it in the background. Returns the bound address
/// (useful when `port` is 0).
pub async fn start_health_server(port: u16) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([0,0,0,0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    tracing::info!(addr = ?bound, "Health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router()).await {
            tracing::error!(error=?e, "Health server failed");
        }
    });
    Ok(bound)
}

async fn ready_handler() -> impl IntoResponse {
    let ready = is_ready();
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, axum::Json(serde_json::json!({"ready": ready})))
}

async fn metrics_handler() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, [("Content-Type", "text/plain")], format!("encode error: {e}").into_bytes());
    }
    (StatusCode::OK, [("Content-Type", "text/plain; version=0.0.4")], buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_endpoints_report_flags_and_status_fields() {
        let addr = start_health_server(0).await.unwrap();
        let base = format!("http://127.0.0.1:{}", addr.port());
        clear_ready();
        let resp = reqwest::get(format!("{base}/ready")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        mark_ready();
        set_status_field("model_version", 7u64);
        let status: serde_json::Value = reqwest::get(format!("{base}/status")).await.unwrap().json().await.unwrap();
        assert_eq!(status["ready"], true);
        assert_eq!(status["model_version"], 7);
        let metrics = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert!(metrics.status().is_success());
    }

    #[test]
    fn init_tracing_is_idempotent() {
        assert!(init_tracing("test").is_ok());
        assert!(init_tracing("test").is_ok());
    }
}
