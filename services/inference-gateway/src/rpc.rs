//! gRPC front end. A process-wide semaphore caps in-flight handlers independently of the HTTP side.

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tonic::{Request, Response, Status};
use tracing::instrument;
use hitserve_proto::predictor::predictor_server::{Predictor, PredictorServer};
use hitserve_proto::predictor::{PredictRequest, PredictResponse};
use crate::error::GatewayError;
use crate::features::RawFeatures;
use crate::service::{PredictionService, Protocol};

pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Clone)]
pub struct PredictorService {
    service: PredictionService,
    workers: Arc<Semaphore>,
}

impl PredictorService {
    pub fn new(service: PredictionService, max_workers: usize) -> Self {
        Self { service, workers: Arc::new(Semaphore::new(max_workers.max(1))) }
    }

    pub fn available_workers(&self) -> usize { self.workers.available_permits() }

    pub fn into_server(self) -> PredictorServer<Self> { PredictorServer::new(self) }
}

#[async_trait]
impl Predictor for PredictorService {
    #[instrument(skip(self, request), fields(remote = ?request.remote_addr()))]
    async fn predict(&self, request: Request<PredictRequest>) -> Result<Response<PredictResponse>, Status> {
        let _permit = self.workers.acquire().await.map_err(|_| Status::unavailable("worker pool closed"))?;
        let req = request.into_inner();
        let raw = RawFeatures { speechiness: req.speechiness, energy: req.energy, danceability: req.danceability, acousticness: req.acousticness };
        let verdict = self.service.predict_raw(Protocol::Rpc, raw).map_err(to_status)?;
        Ok(Response::new(PredictResponse { int_output: verdict.is_successful(), str_output: verdict.label().as_str().to_string() }))
    }
}

fn to_status(e: GatewayError) -> Status {
    if e.is_client_error() { Status::invalid_argument(e.to_string()) } else { Status::internal(e.to_string()) }
}

/// Serves on an already-bound listener until `shutdown` resolves. Plaintext HTTP/2, no auth.
pub async fn serve_with_listener(svc: PredictorService, listener: tokio::net::TcpListener, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    tonic::transport::Server::builder()
        .add_service(svc.into_server())
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;
    Ok(())
}
