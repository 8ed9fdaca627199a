//! Pure scoring: snapshot + validated vector -> verdict.

use crate::error::{GatewayError, Result};
use crate::features::{check_range, FeatureVector, Verdict, FEATURE_COUNT, FEATURE_NAMES};
use crate::model::ModelSnapshot;

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionEngine {
    /// Apply `(x - mean) / std` from the snapshot metadata before scoring.
    pub apply_scaling: bool,
}

impl PredictionEngine {
    pub fn new(apply_scaling: bool) -> Self { Self { apply_scaling } }

    pub fn predict(&self, snapshot: &ModelSnapshot, vector: &FeatureVector) -> Result<Verdict> {
        let mut row = vector.as_row();
        // Front ends validate already; a vector built by hand must still satisfy the contract.
        let violations: Vec<_> = FEATURE_NAMES.iter().zip(row).filter_map(|(name, x)| check_range(name, x).err()).collect();
        if !violations.is_empty() { return Err(GatewayError::InvalidFeatureVector(violations)); }
        if self.apply_scaling { scale(&mut row, snapshot); }
        let score = snapshot.model.score(&row);
        // NaN compares false, so a broken model never reports success
        Ok(Verdict::new(score > 0.0))
    }
}

fn scale(row: &mut [f64; FEATURE_COUNT], snapshot: &ModelSnapshot) {
    let Some(stats) = snapshot.metadata.scaling() else { return };
    for (x, (mean, std)) in row.iter_mut().zip(stats) {
        *x = if std > 0.0 { (*x - mean) / std } else { *x - mean };
    }
}
