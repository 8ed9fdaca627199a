//! The single authoritative serving state and its swap protocol.

use std::sync::Arc;
use arc_swap::ArcSwap;
use tracing::{debug, info, warn};
use crate::error::{GatewayError, Result};
use crate::metrics::SERVING_METRICS;
use crate::model::{decode_artifact, FeatureMetadata, ModelSnapshot};
use crate::registry::{Artifact, LocalArtifactStore, Registry};

/// Owns the current [`ModelSnapshot`]. Reads are a lock-free pointer load; installs are a
/// compare-and-swap that only ever moves the version forward.
pub struct ModelStateManager {
    current: ArcSwap<ModelSnapshot>,
}

impl ModelStateManager {
    pub fn new(initial: ModelSnapshot) -> Self {
        SERVING_METRICS.model_version.set(initial.version as i64);
        hitserve_core::set_status_field("model_version", initial.version);
        Self { current: ArcSwap::from_pointee(initial) }
    }

    /// Startup load: registry first, bundled artifact at version 0 otherwise. Fails only if both
    /// sources are unusable.
    pub async fn bootstrap(registry: &dyn Registry, fallback: &LocalArtifactStore, name: &str, alias: &str) -> anyhow::Result<Self> {
        let bundled_meta = fallback.metadata().await;
        let from_registry = async {
            let artifact = registry.load(name, alias).await?;
            let last_good = bundled_meta.as_ref().cloned().unwrap_or_default();
            snapshot_from_artifact(&artifact, &last_good)
        }.await;
        let snapshot = match from_registry {
            Ok(s) => { info!(version = s.version, model = s.model.kind(), name, alias, "loaded model from registry"); s }
            Err(e) => {
                warn!(error=%e, kind = e.kind(), name, alias, dir = %fallback.dir().display(), "registry load failed, using bundled model");
                let mut snap = fallback.snapshot().await.map_err(|fe| anyhow::anyhow!("registry load failed ({e}) and bundled model unusable ({fe})"))?;
                if let Some(meta) = registry_metadata(registry, name, alias).await {
                    info!(date = ?meta.date, "using registry metadata with bundled model");
                    snap.metadata = meta;
                }
                snap
            }
        };
        Ok(Self::new(snapshot))
    }

    /// Snapshot to use for one request. Callers must not hold it across requests.
    pub fn current(&self) -> Arc<ModelSnapshot> { self.current.load_full() }

    pub fn version(&self) -> u64 { self.current.load().version }

    /// Installs `candidate` iff its version is strictly newer than the one current at install
    /// time. Racing installers are serialised by the CAS loop, so the installed version never
    /// decreases and at most one of two equal-version candidates wins.
    pub fn try_swap(&self, candidate: ModelSnapshot) -> bool {
        match self.install(Arc::new(candidate)) {
            Ok((from, to)) => {
                SERVING_METRICS.swaps_total.inc();
                SERVING_METRICS.model_version.set(to as i64);
                hitserve_core::set_status_field("model_version", to);
                info!(from, to, "model swapped");
                true
            }
            Err(e) => { debug!(reason=%e, "swap candidate discarded"); false }
        }
    }

    /// Returns `(replaced, installed)` versions as seen by the winning CAS.
    fn install(&self, candidate: Arc<ModelSnapshot>) -> Result<(u64, u64)> {
        let mut cur = self.current.load_full();
        loop {
            if candidate.version <= cur.version {
                return Err(GatewayError::StaleVersionRejected { candidate: candidate.version, current: cur.version });
            }
            let prev = self.current.compare_and_swap(&cur, Arc::clone(&candidate));
            if Arc::ptr_eq(&*prev, &cur) { return Ok((cur.version, candidate.version)); }
            // lost a race, re-check against the winner
            cur = arc_swap::Guard::into_inner(prev);
        }
    }

    /// Metadata for a refreshed snapshot: the candidate's document when it parses, otherwise the
    /// current (last-known-good) metadata.
    pub fn metadata_for(&self, candidate_json: Option<&str>) -> FeatureMetadata {
        resolve_metadata(candidate_json, &self.current.load().metadata)
    }
}

async fn registry_metadata(registry: &dyn Registry, name: &str, alias: &str) -> Option<FeatureMetadata> {
    match registry.metadata(name, alias).await {
        Ok(Some(text)) => match FeatureMetadata::from_json(&text) {
            Ok(m) => Some(m),
            Err(e) => { warn!(error=%e, "registry metadata corrupt, ignoring"); None }
        },
        Ok(None) => None,
        Err(e) => { debug!(error=%e, "registry metadata unavailable"); None }
    }
}

pub(crate) fn snapshot_from_artifact(artifact: &Artifact, last_good: &FeatureMetadata) -> Result<ModelSnapshot> {
    let model = decode_artifact(&artifact.bytes)?;
    Ok(ModelSnapshot::new(model, artifact.version, resolve_metadata(artifact.metadata_json.as_deref(), last_good)))
}

fn resolve_metadata(candidate_json: Option<&str>, last_good: &FeatureMetadata) -> FeatureMetadata {
    match candidate_json.map(FeatureMetadata::from_json) {
        Some(Ok(m)) => m,
        Some(Err(e)) => { warn!(error=%e, "metadata document corrupt, keeping last known good"); last_good.clone() }
        None => last_good.clone(),
    }
}
