//! REST front end (axum). Also hosts the GraphQL endpoint so both share one listener.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use crate::error::GatewayError;
use crate::features::ModelOutput;
use crate::service::{PredictionService, Protocol};

pub const WELCOME: &str = "Welcome to the Spotify Success Prediction API";

pub fn router(service: PredictionService) -> Router {
    let api = Router::new()
        .route("/", get(read_root))
        .route("/predict/", post(predict))
        .route("/predict", post(predict))
        .route("/model", get(model_info))
        .with_state(service.clone());
    api.merge(crate::graphql::router(service))
}

async fn read_root() -> Json<Value> { Json(json!({ "message": WELCOME })) }

async fn predict(State(service): State<PredictionService>, body: Result<Json<Value>, JsonRejection>) -> Result<Json<ModelOutput>, ApiError> {
    let Json(body) = body.map_err(|r| ApiError::Malformed(r.body_text()))?;
    let features = match body.get("features") {
        Some(f @ Value::Object(_)) => f,
        Some(_) => return Err(ApiError::Detail(vec![detail(&["body", "features"], "features must be an object", "type_error.dict")])),
        None => return Err(ApiError::Detail(vec![detail(&["body", "features"], "field required", "value_error.missing")])),
    };
    let verdict = service.predict_json(Protocol::Rest, features)?;
    Ok(Json(verdict.into()))
}

async fn model_info(State(service): State<PredictionService>) -> Json<Value> {
    let snap = service.state().current();
    Json(json!({
        "version": snap.version,
        "model_kind": snap.model.kind(),
        "feature_names": snap.metadata.feature_names,
        "date": snap.metadata.date,
    }))
}

/// Error body mirrors the FastAPI/pydantic `detail` list so existing clients keep parsing it.
#[derive(Debug)]
pub enum ApiError {
    Malformed(String),
    Detail(Vec<Value>),
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        if !e.is_client_error() { return ApiError::Internal(e.to_string()); }
        let details = e.violations().iter()
            .map(|v| detail(&["body", "features", v.field.as_str()], &v.message, &format!("value_error.{}", v.kind.as_str())))
            .collect();
        ApiError::Detail(details)
    }
}

fn detail(loc: &[&str], msg: &str, kind: &str) -> Value { json!({ "loc": loc, "msg": msg, "type": kind }) }

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Malformed(msg) => (StatusCode::BAD_REQUEST, Json(json!({ "detail": [detail(&["body"], &msg, "value_error.jsondecode")] }))).into_response(),
            ApiError::Detail(d) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": d }))).into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error=%msg, "prediction failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": msg }))).into_response()
            }
        }
    }
}
