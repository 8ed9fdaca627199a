//! Served artifacts: the predictor trait, the JSON artifact codec and the immutable snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::{GatewayError, Result};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES};

/// Anything that can score one row laid out in [`crate::features::FEATURE_NAMES`] order.
/// A positive score means "successful".
pub trait Predictor: Send + Sync + fmt::Debug {
    fn score(&self, row: &[f64]) -> f64;
    fn kind(&self) -> &'static str;
}

/// On-disk / registry artifact format (`model.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Decision function `w . x + b`, as exported from a linear classifier.
    Linear { coefficients: Vec<f64>, intercept: f64 },
    /// Single-feature cut: `x[feature] - cutoff`.
    Threshold { feature: usize, cutoff: f64 },
    Constant { score: f64 },
}

#[derive(Debug, Clone)]
pub struct LinearModel { coefficients: Vec<f64>, intercept: f64 }

impl Predictor for LinearModel {
    fn score(&self, row: &[f64]) -> f64 {
        self.coefficients.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + self.intercept
    }
    fn kind(&self) -> &'static str { "linear" }
}

#[derive(Debug, Clone)]
pub struct ThresholdModel { feature: usize, cutoff: f64 }

impl Predictor for ThresholdModel {
    fn score(&self, row: &[f64]) -> f64 { row.get(self.feature).map(|x| x - self.cutoff).unwrap_or(f64::NAN) }
    fn kind(&self) -> &'static str { "threshold" }
}

#[derive(Debug, Clone)]
pub struct ConstantModel(pub f64);

impl Predictor for ConstantModel {
    fn score(&self, _row: &[f64]) -> f64 { self.0 }
    fn kind(&self) -> &'static str { "constant" }
}

impl ModelSpec {
    /// Checks the model can score a four-feature row before it is allowed anywhere near a swap.
    pub fn into_predictor(self) -> Result<Arc<dyn Predictor>> {
        match self {
            ModelSpec::Linear { coefficients, intercept } => {
                if coefficients.len() != FEATURE_COUNT {
                    return Err(GatewayError::SerializationFailure(format!("linear model has {} coefficients, expected {FEATURE_COUNT}", coefficients.len())));
                }
                if !intercept.is_finite() || coefficients.iter().any(|w| !w.is_finite()) {
                    return Err(GatewayError::SerializationFailure("linear model has non-finite weights".into()));
                }
                Ok(Arc::new(LinearModel { coefficients, intercept }))
            }
            ModelSpec::Threshold { feature, cutoff } => {
                if feature >= FEATURE_COUNT { return Err(GatewayError::SerializationFailure(format!("threshold feature index {feature} out of range"))); }
                Ok(Arc::new(ThresholdModel { feature, cutoff }))
            }
            ModelSpec::Constant { score } => Ok(Arc::new(ConstantModel(score))),
        }
    }
}

pub fn decode_artifact(bytes: &[u8]) -> Result<Arc<dyn Predictor>> {
    let spec: ModelSpec = serde_json::from_slice(bytes)?;
    spec.into_predictor()
}

/// Training-time metadata document (`data.json`). Every key is optional and unknown keys are kept,
/// so a document read and written back is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mean: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub std: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_after_scaling: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_dtypes: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_observations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_observations: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FeatureMetadata {
    pub fn from_json(text: &str) -> Result<Self> { Ok(serde_json::from_str(text)?) }

    /// Per-feature `(mean, std)` in canonical column order. Statistics are matched by
    /// `feature_names` when present, by position otherwise; `None` unless every model column has
    /// an entry.
    pub fn scaling(&self) -> Option<[(f64, f64); FEATURE_COUNT]> {
        if self.mean.len() != self.std.len() { return None; }
        let mut out = [(0.0, 1.0); FEATURE_COUNT];
        if self.feature_names.is_empty() {
            if self.mean.len() != FEATURE_COUNT { return None; }
            for (i, slot) in out.iter_mut().enumerate() { *slot = (self.mean[i], self.std[i]); }
            return Some(out);
        }
        if self.feature_names.len() != self.mean.len() { return None; }
        for (slot, name) in out.iter_mut().zip(FEATURE_NAMES) {
            let i = self.feature_names.iter().position(|n| n == name)?;
            *slot = (self.mean[i], self.std[i]);
        }
        Some(out)
    }
}

/// The unit of serving state. Never mutated after construction; a newer one replaces it whole.
#[derive(Clone)]
pub struct ModelSnapshot {
    pub model: Arc<dyn Predictor>,
    pub version: u64,
    pub metadata: FeatureMetadata,
}

impl ModelSnapshot {
    pub fn new(model: Arc<dyn Predictor>, version: u64, metadata: FeatureMetadata) -> Self { Self { model, version, metadata } }
}

impl fmt::Debug for ModelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSnapshot").field("version", &self.version).field("model", &self.model.kind()).field("features", &self.metadata.feature_names).finish()
    }
}
