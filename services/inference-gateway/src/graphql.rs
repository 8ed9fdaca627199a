//! GraphQL front end: `predict(...)` plus a `modelVersion` probe.

use async_graphql::http::GraphiQLSource;
use async_graphql::{Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use crate::error::GatewayError;
use crate::features::{RawFeatures, Verdict};
use crate::service::{PredictionService, Protocol};

pub type GatewaySchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
#[graphql(name = "ModelOutput")]
pub struct ModelOutputGql {
    pub int_output: bool,
    pub str_output: String,
}

impl From<Verdict> for ModelOutputGql {
    fn from(v: Verdict) -> Self { Self { int_output: v.is_successful(), str_output: v.label().as_str().to_string() } }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Predicts whether a track with these audio features will be successful.
    async fn predict(&self, ctx: &Context<'_>, speechiness: f64, energy: f64, danceability: f64, acousticness: f64) -> async_graphql::Result<ModelOutputGql> {
        let service = ctx.data::<PredictionService>()?;
        service.predict_raw(Protocol::GraphQl, RawFeatures::new(speechiness, energy, danceability, acousticness))
            .map(Into::into)
            .map_err(to_graphql_error)
    }

    /// Version of the model answering `predict` right now.
    async fn model_version(&self, ctx: &Context<'_>) -> async_graphql::Result<u64> {
        Ok(ctx.data::<PredictionService>()?.state().version())
    }
}

fn to_graphql_error(e: GatewayError) -> async_graphql::Error {
    let client = e.is_client_error();
    let fields: Vec<async_graphql::Value> = e.violations().iter().map(|v| async_graphql::Value::from(v.field.clone())).collect();
    async_graphql::Error::new(e.to_string()).extend_with(|_, ext| {
        if client {
            ext.set("code", "BAD_USER_INPUT");
            if let Some(first) = fields.first() { ext.set("field", first.clone()); }
            ext.set("fields", async_graphql::Value::List(fields.clone()));
        } else {
            ext.set("code", "INTERNAL_SERVER_ERROR");
        }
    })
}

pub fn schema(service: PredictionService) -> GatewaySchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription).data(service).finish()
}

pub fn router(service: PredictionService) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .with_state(schema(service))
}

async fn graphql_handler(State(schema): State<GatewaySchema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> impl IntoResponse { Html(GraphiQLSource::build().endpoint("/graphql").finish()) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::positive_service;

    #[tokio::test]
    async fn predict_query_mirrors_verdict() {
        let schema = schema(positive_service());
        let resp = schema.execute("{ predict(speechiness: 0.0444, energy: 0.521, danceability: 0.514, acousticness: 0.713) { intOutput strOutput } }").await;
        assert!(resp.errors.is_empty(), "{:?}", resp.errors);
        let data = resp.data.into_json().unwrap();
        assert_eq!(data, serde_json::json!({"predict": {"intOutput": true, "strOutput": "Successful"}}));
    }

    #[tokio::test]
    async fn out_of_range_is_bad_user_input() {
        let schema = schema(positive_service());
        let resp = schema.execute("{ predict(speechiness: 0.1, energy: 1.5, danceability: 0.1, acousticness: 0.1) { intOutput } }").await;
        assert_eq!(resp.errors.len(), 1);
        let ext = serde_json::to_value(&resp.errors[0].extensions).unwrap();
        assert_eq!(ext["code"], "BAD_USER_INPUT");
        assert_eq!(ext["field"], "energy");
    }

    #[tokio::test]
    async fn missing_argument_is_a_query_error() {
        let schema = schema(positive_service());
        let resp = schema.execute("{ predict(speechiness: 0.1, energy: 0.5, danceability: 0.1) { intOutput } }").await;
        assert!(!resp.errors.is_empty());
    }

    #[tokio::test]
    async fn model_version_is_exposed() {
        let resp = schema(positive_service()).execute("{ modelVersion }").await;
        assert_eq!(resp.data.into_json().unwrap(), serde_json::json!({"modelVersion": 1}));
    }
}
