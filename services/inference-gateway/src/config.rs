use std::net::SocketAddr;
use std::time::Duration;
use anyhow::Result;
use serde::Deserialize;
use hitserve_resilience::RetryPolicy;
use crate::registry::HttpRegistryOptions;

pub const SERVICE_NAME: &str = "inference-gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub service_name: String,
    pub config_version: String,
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub model: ModelConfig,
    pub refresh: RefreshConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub grpc_addr: SocketAddr,
    pub health_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// `http` (MLflow + blob store) or `memory` (offline, always unreachable).
    pub backend: String,
    pub tracking_uri: String,
    pub blob_url: String,
    pub metadata_bucket: String,
    pub metadata_key: String,
    pub timeout_ms: u64,
    pub retries: usize,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub alias: String,
    pub fallback_dir: String,
    pub apply_scaling: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    pub min_interval_ms: u64,
    /// 0 disables the timer; per-request triggering stays on.
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub max_workers: usize,
}

impl GatewayConfig {
    /// Defaults, then `HITSERVE_CONFIG_FILE`, then `HITSERVE__SECTION__KEY` variables.
    pub fn load() -> Result<Self> {
        let cfg = hitserve_core::config_builder(SERVICE_NAME)?
            .set_default("server.http_addr", "0.0.0.0:8800")?
            .set_default("server.grpc_addr", "0.0.0.0:50051")?
            .set_default("server.health_port", 9091)?
            .set_default("registry.backend", "http")?
            .set_default("registry.tracking_uri", "http://mlflow:5000")?
            .set_default("registry.blob_url", "http://s3:9000")?
            .set_default("registry.metadata_bucket", "data")?
            .set_default("registry.metadata_key", "data_info/data.json")?
            .set_default("registry.timeout_ms", 2000)?
            .set_default("registry.retries", 2)?
            .set_default("registry.breaker_threshold", 5)?
            .set_default("registry.breaker_cooldown_secs", 30)?
            .set_default("model.name", "spotify_model_prod")?
            .set_default("model.alias", "champion")?
            .set_default("model.fallback_dir", "/app/files")?
            .set_default("model.apply_scaling", false)?
            .set_default("refresh.min_interval_ms", 1000)?
            .set_default("refresh.poll_interval_secs", 0)?
            .set_default("rpc.max_workers", crate::rpc::DEFAULT_MAX_WORKERS as i64)?
            .build()?;
        hitserve_core::record_config_version(&cfg);
        Ok(cfg.try_deserialize()?)
    }

    pub fn registry_options(&self) -> HttpRegistryOptions {
        let r = &self.registry;
        HttpRegistryOptions {
            tracking_uri: r.tracking_uri.clone(),
            blob_url: r.blob_url.clone(),
            metadata_bucket: r.metadata_bucket.clone(),
            metadata_key: r.metadata_key.clone(),
            timeout: Duration::from_millis(r.timeout_ms),
            // first try plus `retries` more
            retry: RetryPolicy { attempts: r.retries + 1, ..Default::default() },
            breaker_threshold: r.breaker_threshold,
            breaker_cooldown: Duration::from_secs(r.breaker_cooldown_secs),
        }
    }

    pub fn min_refresh_interval(&self) -> Duration { Duration::from_millis(self.refresh.min_interval_ms) }
}
