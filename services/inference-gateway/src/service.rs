//! The one validate -> snapshot -> score -> refresh path every transport goes through.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use crate::engine::PredictionEngine;
use crate::error::Result;
use crate::features::{FeatureVector, RawFeatures, Verdict};
use crate::metrics::SERVING_METRICS;
use crate::refresh::RefreshTrigger;
use crate::state::ModelStateManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol { Rest, GraphQl, Rpc }

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self { Protocol::Rest => "rest", Protocol::GraphQl => "graphql", Protocol::Rpc => "rpc" }
    }
}

/// Shared by all front ends; cheap to clone.
#[derive(Clone)]
pub struct PredictionService {
    state: Arc<ModelStateManager>,
    refresh: RefreshTrigger,
    engine: PredictionEngine,
}

impl PredictionService {
    pub fn new(state: Arc<ModelStateManager>, refresh: RefreshTrigger, engine: PredictionEngine) -> Self { Self { state, refresh, engine } }

    pub fn state(&self) -> &Arc<ModelStateManager> { &self.state }

    pub fn predict_raw(&self, protocol: Protocol, raw: RawFeatures) -> Result<Verdict> {
        match raw.validate() {
            Ok(vector) => self.predict(protocol, &vector),
            Err(e) => { self.reject(protocol, &e); Err(e) }
        }
    }

    /// Decodes the REST `features` object, reporting every bad field.
    pub fn predict_json(&self, protocol: Protocol, features: &serde_json::Value) -> Result<Verdict> {
        match FeatureVector::from_json(features) {
            Ok(vector) => self.predict(protocol, &vector),
            Err(e) => { self.reject(protocol, &e); Err(e) }
        }
    }

    fn predict(&self, protocol: Protocol, vector: &FeatureVector) -> Result<Verdict> {
        let started = Instant::now();
        let snapshot = self.state.current();
        let verdict = self.engine.predict(&snapshot, vector)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        SERVING_METRICS.predict_latency_ms.with_label_values(&[protocol.as_str()]).observe(elapsed_ms);
        SERVING_METRICS.predictions_total.with_label_values(&[protocol.as_str(), verdict.label().as_str()]).inc();
        debug!(protocol = protocol.as_str(), version = snapshot.version, label = %verdict.label(), elapsed_ms, "prediction served");
        drop(snapshot);
        // not awaited: the caller's response never waits on the registry
        let _ = self.refresh.trigger();
        Ok(verdict)
    }

    fn reject(&self, protocol: Protocol, err: &crate::error::GatewayError) {
        SERVING_METRICS.validation_rejections_total.with_label_values(&[protocol.as_str()]).inc();
        debug!(protocol = protocol.as_str(), error = %err, "request rejected");
    }
}
