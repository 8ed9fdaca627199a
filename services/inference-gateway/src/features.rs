//! Canonical request/response values shared by every transport.

use serde::Serialize;
use serde_json::Value;
use crate::error::{FieldViolation, GatewayError, Result, ViolationKind};

/// Column order the served models were fit with.
pub const FEATURE_NAMES: [&str; 4] = ["speechiness", "energy", "danceability", "acousticness"];
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Wire input before validation. `None` means the field was absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawFeatures {
    pub speechiness: Option<f64>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
    pub acousticness: Option<f64>,
}

impl RawFeatures {
    pub fn new(speechiness: f64, energy: f64, danceability: f64, acousticness: f64) -> Self {
        Self { speechiness: Some(speechiness), energy: Some(energy), danceability: Some(danceability), acousticness: Some(acousticness) }
    }

    /// Reads the four fields out of a JSON object, recording a violation for every field that is
    /// absent, null or not a number.
    pub fn from_json(obj: &Value) -> (Self, Vec<FieldViolation>) {
        let mut violations = Vec::new();
        let mut read = |name: &str| -> Option<f64> {
            match obj.get(name) {
                None | Some(Value::Null) => { violations.push(violation(name, ViolationKind::Missing, "field required".into())); None }
                Some(v) => match v.as_f64() {
                    Some(x) => Some(x),
                    None => { violations.push(violation(name, ViolationKind::NonNumeric, format!("value is not a valid float: {v}"))); None }
                },
            }
        };
        let raw = Self { speechiness: read("speechiness"), energy: read("energy"), danceability: read("danceability"), acousticness: read("acousticness") };
        (raw, violations)
    }

    fn values(&self) -> [Option<f64>; FEATURE_COUNT] { [self.speechiness, self.energy, self.danceability, self.acousticness] }

    pub fn validate(&self) -> Result<FeatureVector> { FeatureVector::try_from_slots(self.values(), Vec::new()) }
}

/// A validated vector: all four features present, finite and within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub speechiness: f64,
    pub energy: f64,
    pub danceability: f64,
    pub acousticness: f64,
}

impl FeatureVector {
    /// Combines decode-time violations (missing / non-numeric) with range checks so the caller
    /// sees every bad field at once.
    pub fn from_json(obj: &Value) -> Result<Self> {
        let (raw, violations) = RawFeatures::from_json(obj);
        Self::try_from_slots(raw.values(), violations)
    }

    fn try_from_slots(values: [Option<f64>; FEATURE_COUNT], mut violations: Vec<FieldViolation>) -> Result<Self> {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, (name, value)) in FEATURE_NAMES.iter().zip(values).enumerate() {
            match value {
                None => {
                    if !violations.iter().any(|v| v.field == *name) { violations.push(violation(name, ViolationKind::Missing, "field required".into())); }
                }
                Some(x) => match check_range(name, x) {
                    Ok(x) => out[i] = x,
                    Err(v) => violations.push(v),
                },
            }
        }
        if !violations.is_empty() {
            violations.sort_by_key(|v| FEATURE_NAMES.iter().position(|n| *n == v.field));
            return Err(GatewayError::InvalidFeatureVector(violations));
        }
        Ok(Self { speechiness: out[0], energy: out[1], danceability: out[2], acousticness: out[3] })
    }

    /// Row in model column order.
    pub fn as_row(&self) -> [f64; FEATURE_COUNT] { [self.speechiness, self.energy, self.danceability, self.acousticness] }
}

pub(crate) fn check_range(name: &str, x: f64) -> std::result::Result<f64, FieldViolation> {
    if !x.is_finite() {
        return Err(violation(name, ViolationKind::NonNumeric, format!("value is not a finite float: {x}")));
    }
    if !(0.0..=1.0).contains(&x) {
        return Err(violation(name, ViolationKind::OutOfRange, format!("must be within [0, 1], got {x}")));
    }
    Ok(x)
}

fn violation(field: &str, kind: ViolationKind, message: String) -> FieldViolation {
    FieldViolation { field: field.to_string(), kind, message }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    #[serde(rename = "Not Successful")]
    NotSuccessful,
    #[serde(rename = "Successful")]
    Successful,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self { Label::NotSuccessful => "Not Successful", Label::Successful => "Successful" }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Model decision. Only constructible from the boolean so the label can never disagree with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict { is_successful: bool }

impl Verdict {
    pub fn new(is_successful: bool) -> Self { Self { is_successful } }
    pub fn is_successful(&self) -> bool { self.is_successful }
    pub fn label(&self) -> Label { if self.is_successful { Label::Successful } else { Label::NotSuccessful } }
}

/// Wire shape shared by REST (`int_output` / `str_output`) and the RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelOutput {
    pub int_output: bool,
    pub str_output: Label,
}

impl From<Verdict> for ModelOutput {
    fn from(v: Verdict) -> Self { Self { int_output: v.is_successful(), str_output: v.label() } }
}
