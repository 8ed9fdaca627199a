use serde::Serialize;
use thiserror::Error;

/// One rejected input field. `kind` is a stable machine-readable tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind { Missing, NonNumeric, OutOfRange }

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self { ViolationKind::Missing => "missing", ViolationKind::NonNumeric => "non_numeric", ViolationKind::OutOfRange => "out_of_range" }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("no published version for {name}@{alias}")]
    ArtifactNotFound { name: String, alias: String },
    #[error("invalid feature vector: {}", summarize(.0))]
    InvalidFeatureVector(Vec<FieldViolation>),
    #[error("stale version {candidate} rejected (current {current})")]
    StaleVersionRejected { candidate: u64, current: u64 },
    #[error("serialization failure: {0}")]
    SerializationFailure(String),
}

impl GatewayError {
    /// True for errors caused by the caller's input (4xx on every protocol).
    pub fn is_client_error(&self) -> bool { matches!(self, GatewayError::InvalidFeatureVector(_)) }

    /// Short label used for metrics and refresh outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RegistryUnavailable(_) => "registry_unavailable",
            GatewayError::ArtifactNotFound { .. } => "artifact_not_found",
            GatewayError::InvalidFeatureVector(_) => "invalid_feature_vector",
            GatewayError::StaleVersionRejected { .. } => "stale_version_rejected",
            GatewayError::SerializationFailure(_) => "serialization_failure",
        }
    }

    pub fn violations(&self) -> &[FieldViolation] {
        match self { GatewayError::InvalidFeatureVector(v) => v, _ => &[] }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self { GatewayError::SerializationFailure(e.to_string()) }
}

fn summarize(v: &[FieldViolation]) -> String {
    v.iter().map(|f| format!("{}: {}", f.field, f.message)).collect::<Vec<_>>().join("; ")
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
