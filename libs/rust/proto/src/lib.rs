// Generated protobuf modules via tonic's include_proto! macro.
// Each module corresponds to a proto package (package hitserve.predictor -> module predictor).
// Usage example:
//   use hitserve_proto::predictor::predictor_server::PredictorServer;
//   use hitserve_proto::predictor::{PredictRequest, PredictResponse};

pub mod predictor { tonic::include_proto!("hitserve.predictor"); }

/// SHA-256 over every .proto file compiled into this crate.
pub const SCHEMA_VERSION: &str = env!("PROTO_SCHEMA_VERSION");

pub use predictor::*;
