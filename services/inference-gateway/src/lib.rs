//! inference-gateway: serves the champion classifier over REST, GraphQL and gRPC while a
//! background refresh keeps it in step with the model registry.

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod graphql;
pub mod metrics;
pub mod model;
pub mod refresh;
pub mod registry;
pub mod rest;
pub mod rpc;
pub mod service;
pub mod state;

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};
use hitserve_core::{init_tracing, mark_ready, clear_ready, set_status_field, start_health_server};

pub use config::GatewayConfig;
pub use engine::PredictionEngine;
pub use error::GatewayError;
pub use features::{FeatureVector, Label, RawFeatures, Verdict};
pub use model::{FeatureMetadata, ModelSnapshot, Predictor};
pub use refresh::{RefreshOutcome, RefreshTrigger};
pub use registry::{Artifact, HttpRegistry, InMemoryRegistry, LocalArtifactStore, Registry};
pub use service::{PredictionService, Protocol};
pub use state::ModelStateManager;

pub fn registry_from_config(cfg: &GatewayConfig) -> Result<Arc<dyn Registry>> {
    match cfg.registry.backend.as_str() {
        "http" => Ok(Arc::new(HttpRegistry::new(cfg.registry_options())?)),
        "memory" => Ok(Arc::new(InMemoryRegistry::unreachable())),
        other => anyhow::bail!("unknown registry backend {other:?}"),
    }
}

/// Loads the initial model and wires the shared prediction path. Starts the refresh poller when
/// configured.
pub async fn assemble(cfg: &GatewayConfig, registry: Arc<dyn Registry>) -> Result<PredictionService> {
    let fallback = LocalArtifactStore::new(&cfg.model.fallback_dir);
    let state = Arc::new(ModelStateManager::bootstrap(registry.as_ref(), &fallback, &cfg.model.name, &cfg.model.alias).await?);
    let refresh = RefreshTrigger::new(state.clone(), registry, cfg.model.name.clone(), cfg.model.alias.clone(), cfg.min_refresh_interval());
    if cfg.refresh.poll_interval_secs > 0 {
        refresh.spawn_poller(std::time::Duration::from_secs(cfg.refresh.poll_interval_secs));
    }
    Ok(PredictionService::new(state, refresh, PredictionEngine::new(cfg.model.apply_scaling)))
}

/// Binds both listeners, then runs them until `shutdown` resolves. A bind failure is returned
/// before the process reports ready.
pub async fn serve(cfg: &GatewayConfig, service: PredictionService, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let http_listener = TcpListener::bind(cfg.server.http_addr).await
        .with_context(|| format!("bind HTTP listener on {}", cfg.server.http_addr))?;
    let grpc_listener = TcpListener::bind(cfg.server.grpc_addr).await
        .with_context(|| format!("bind gRPC listener on {}", cfg.server.grpc_addr))?;
    serve_on(service, http_listener, grpc_listener, cfg.rpc.max_workers, shutdown).await
}

/// Runs REST + GraphQL and gRPC on bound listeners. Returns an error as soon as either server
/// stops on its own; both are drained when `shutdown` resolves.
pub async fn serve_on(service: PredictionService, http_listener: TcpListener, grpc_listener: TcpListener, max_workers: usize, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    info!(addr = %http_listener.local_addr()?, "HTTP server listening (REST + /graphql)");
    info!(addr = %grpc_listener.local_addr()?, workers = max_workers, schema = hitserve_proto::SCHEMA_VERSION, "gRPC server listening");
    set_status_field("proto_schema_version", hitserve_proto::SCHEMA_VERSION);

    let mut http_stop = stop_rx.clone();
    let mut http = tokio::spawn(axum::serve(http_listener, rest::router(service.clone()))
        .with_graceful_shutdown(async move { let _ = http_stop.changed().await; })
        .into_future());
    let mut rpc_stop = stop_rx;
    let rpc_svc = rpc::PredictorService::new(service, max_workers);
    let mut rpc = tokio::spawn(rpc::serve_with_listener(rpc_svc, grpc_listener, async move { let _ = rpc_stop.changed().await; }));
    mark_ready();

    let outcome = tokio::select! {
        _ = shutdown => Ok(()),
        res = &mut http => Err(server_exit("HTTP", res.map(|r| r.map_err(anyhow::Error::from)))),
        res = &mut rpc => Err(server_exit("gRPC", res)),
    };
    clear_ready();
    let _ = stop_tx.send(true);
    match outcome {
        Ok(()) => {
            info!("shutdown requested, draining listeners");
            http.await??;
            rpc.await??;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "server stopped, shutting down");
            http.abort();
            rpc.abort();
            Err(e)
        }
    }
}

fn server_exit(name: &str, res: std::result::Result<Result<()>, tokio::task::JoinError>) -> anyhow::Error {
    match res {
        Ok(Ok(())) => anyhow::anyhow!("{name} server exited unexpectedly"),
        Ok(Err(e)) => e.context(format!("{name} server failed")),
        Err(e) => anyhow::Error::from(e).context(format!("{name} server task failed")),
    }
}

pub async fn run() -> Result<()> {
    init_tracing(config::SERVICE_NAME)?;
    let cfg = GatewayConfig::load()?;
    info!(target: "inference-gateway", ?cfg, "config loaded");
    start_health_server(cfg.server.health_port).await?;
    let registry = registry_from_config(&cfg)?;
    let service = assemble(&cfg, registry).await?;
    info!(target: "inference-gateway", version = service.state().version(), "model ready");
    serve(&cfg, service, async { let _ = tokio::signal::ctrl_c().await; }).await
}
