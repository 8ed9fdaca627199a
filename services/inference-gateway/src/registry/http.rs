//! MLflow-compatible registry client. Alias lookups go to the tracking server, model bytes to the
//! artifact location it reports, the metadata document to the blob store.

use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use hitserve_resilience::{retry_async, CircuitBreaker, ResilienceError, RetryPolicy};
use crate::error::{GatewayError, Result};
use super::{Artifact, Registry, MODEL_FILE};

#[derive(Debug, Clone)]
pub struct HttpRegistryOptions {
    pub tracking_uri: String,
    pub blob_url: String,
    pub metadata_bucket: String,
    pub metadata_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for HttpRegistryOptions {
    fn default() -> Self {
        Self {
            tracking_uri: "http://mlflow:5000".into(),
            blob_url: "http://s3:9000".into(),
            metadata_bucket: "data".into(),
            metadata_key: "data_info/data.json".into(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

pub struct HttpRegistry {
    client: reqwest::Client,
    opts: HttpRegistryOptions,
    breaker: CircuitBreaker,
}

struct AliasTarget { version: u64, source: String }

impl HttpRegistry {
    pub fn new(opts: HttpRegistryOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .build()
            .map_err(|e| GatewayError::RegistryUnavailable(format!("http client: {e}")))?;
        let breaker = CircuitBreaker::new(opts.breaker_threshold, opts.breaker_cooldown);
        Ok(Self { client, opts, breaker })
    }

    /// Retries transport failures, and trips the breaker only on them: "not found" proves the
    /// registry is up.
    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T>
    where F: FnMut(usize) -> Fut, Fut: Future<Output = Result<T>> {
        self.breaker.call(|| retry_async(&self.opts.retry, op, is_unavailable), is_unavailable).await
            .unwrap_or_else(|ResilienceError::CircuitOpen| Err(GatewayError::RegistryUnavailable("circuit open".into())))
    }

    async fn resolve_alias(&self, name: &str, alias: &str) -> Result<AliasTarget> {
        let url = format!("{}/api/2.0/mlflow/registered-models/alias", self.opts.tracking_uri.trim_end_matches('/'));
        self.guarded(|attempt| {
            let url = url.clone();
            async move {
                debug!(%url, name, alias, attempt, "resolving alias");
                let resp = self.client.get(&url).query(&[("name", name), ("alias", alias)]).send().await.map_err(unavailable)?;
                let status = resp.status();
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                if !status.is_success() {
                    let code = body.get("error_code").and_then(Value::as_str).unwrap_or_default();
                    if status == StatusCode::NOT_FOUND || code == "RESOURCE_DOES_NOT_EXIST" {
                        return Err(GatewayError::ArtifactNotFound { name: name.to_string(), alias: alias.to_string() });
                    }
                    return Err(GatewayError::RegistryUnavailable(format!("alias lookup returned {status} {code}")));
                }
                parse_alias_body(&body)
            }
        }).await
    }

    fn artifact_url(&self, source: &str) -> Result<String> {
        let source = source.trim_end_matches('/');
        if let Some(path) = source.strip_prefix("mlflow-artifacts:") {
            return Ok(format!("{}/api/2.0/mlflow-artifacts/artifacts/{}/{MODEL_FILE}", self.opts.tracking_uri.trim_end_matches('/'), path.trim_start_matches('/')));
        }
        if let Some(path) = source.strip_prefix("s3://") {
            return Ok(format!("{}/{path}/{MODEL_FILE}", self.opts.blob_url.trim_end_matches('/')));
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(format!("{source}/{MODEL_FILE}"));
        }
        Err(GatewayError::SerializationFailure(format!("unsupported artifact source {source}")))
    }

    async fn fetch(&self, url: &str, name: &str, alias: &str) -> Result<Vec<u8>> {
        self.guarded(|_| async move {
            let resp = self.client.get(url).send().await.map_err(unavailable)?;
            match resp.status() {
                s if s.is_success() => resp.bytes().await.map(|b| b.to_vec()).map_err(unavailable),
                StatusCode::NOT_FOUND => Err(GatewayError::ArtifactNotFound { name: name.to_string(), alias: alias.to_string() }),
                s => Err(GatewayError::RegistryUnavailable(format!("GET {url} returned {s}"))),
            }
        }).await
    }

    async fn fetch_metadata(&self, name: &str, alias: &str) -> Option<String> {
        let url = format!("{}/{}/{}", self.opts.blob_url.trim_end_matches('/'), self.opts.metadata_bucket, self.opts.metadata_key.trim_start_matches('/'));
        match self.fetch(&url, name, alias).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(e) => { warn!(error=%e, %url, "metadata document is not utf-8"); None }
            },
            Err(e) => { warn!(error=%e, %url, "metadata document unavailable"); None }
        }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn head_version(&self, name: &str, alias: &str) -> Result<u64> {
        Ok(self.resolve_alias(name, alias).await?.version)
    }

    async fn load(&self, name: &str, alias: &str) -> Result<Artifact> {
        let target = self.resolve_alias(name, alias).await?;
        let url = self.artifact_url(&target.source)?;
        let bytes = self.fetch(&url, name, alias).await?;
        let metadata_json = self.fetch_metadata(name, alias).await;
        Ok(Artifact { bytes, version: target.version, metadata_json })
    }

    async fn metadata(&self, name: &str, alias: &str) -> Result<Option<String>> {
        Ok(self.fetch_metadata(name, alias).await)
    }
}

fn is_unavailable(e: &GatewayError) -> bool { matches!(e, GatewayError::RegistryUnavailable(_)) }

fn unavailable(e: reqwest::Error) -> GatewayError { GatewayError::RegistryUnavailable(e.to_string()) }

// MLflow encodes the version as a string; accept a bare number too.
fn parse_alias_body(body: &Value) -> Result<AliasTarget> {
    let mv = body.get("model_version").ok_or_else(|| GatewayError::SerializationFailure("alias response missing model_version".into()))?;
    let version = match mv.get("version") {
        Some(Value::String(s)) => s.parse::<u64>().map_err(|e| GatewayError::SerializationFailure(format!("bad version {s:?}: {e}")))?,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| GatewayError::SerializationFailure(format!("bad version {n}")))?,
        _ => return Err(GatewayError::SerializationFailure("alias response missing version".into())),
    };
    let source = mv.get("source").and_then(Value::as_str).unwrap_or_default().to_string();
    Ok(AliasTarget { version, source })
}
