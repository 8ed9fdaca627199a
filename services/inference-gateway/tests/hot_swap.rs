//! Startup fallback, refresh-on-request and swap convergence against a programmable registry.

use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use inference_gateway::model::ConstantModel;
use inference_gateway::registry::{MODEL_FILE, METADATA_FILE};
use inference_gateway::{assemble, Artifact, FeatureMetadata, GatewayConfig, InMemoryRegistry, ModelSnapshot, ModelStateManager, PredictionEngine, PredictionService, Protocol, RefreshOutcome, RefreshTrigger, Registry};

const NAME: &str = "spotify_model_prod";
const ALIAS: &str = "champion";

fn artifact(version: u64, score: f64) -> Artifact {
    Artifact {
        bytes: json!({"kind": "constant", "score": score}).to_string().into_bytes(),
        version,
        metadata_json: Some(json!({"feature_names": ["speechiness", "energy", "danceability", "acousticness"], "date": format!("v{version}")}).to_string()),
    }
}

fn features() -> serde_json::Value { json!({"speechiness": 0.0444, "energy": 0.521, "danceability": 0.514, "acousticness": 0.713}) }

fn test_config(fallback: &std::path::Path) -> GatewayConfig {
    let mut cfg = GatewayConfig::load().unwrap();
    cfg.model.fallback_dir = fallback.display().to_string();
    cfg.refresh.min_interval_ms = 0;
    cfg
}

#[tokio::test]
async fn unreachable_registry_serves_bundled_model_at_version_zero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(MODEL_FILE), r#"{"kind":"constant","score":1.0}"#).unwrap();
    std::fs::write(dir.path().join(METADATA_FILE), r#"{"feature_names":["speechiness","energy","danceability","acousticness"],"date":"bundled"}"#).unwrap();
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::unreachable());

    let service = assemble(&test_config(dir.path()), registry).await.unwrap();
    assert_eq!(service.state().version(), 0);
    assert_eq!(service.state().current().metadata.date.as_deref(), Some("bundled"));
    let verdict = service.predict_json(Protocol::Rest, &features()).unwrap();
    assert!(verdict.is_successful());
}

#[tokio::test]
async fn startup_fails_only_when_both_sources_are_unusable() {
    let dir = tempfile::tempdir().unwrap();
    let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::unreachable());
    assert!(assemble(&test_config(dir.path()), registry).await.is_err());

    let published = Arc::new(InMemoryRegistry::new());
    published.publish(NAME, ALIAS, artifact(4, 1.0));
    let service = assemble(&test_config(dir.path()), published).await.unwrap();
    assert_eq!(service.state().version(), 4);
}

#[tokio::test]
async fn request_schedules_refresh_and_next_request_sees_new_version() {
    let state = Arc::new(ModelStateManager::new(ModelSnapshot::new(Arc::new(ConstantModel(-1.0)), 2, FeatureMetadata::default())));
    let registry = Arc::new(InMemoryRegistry::new());
    registry.publish(NAME, ALIAS, artifact(3, 1.0));
    let refresh = RefreshTrigger::new(state.clone(), registry.clone(), NAME, ALIAS, Duration::ZERO);
    let service = PredictionService::new(state.clone(), refresh, PredictionEngine::default());

    // answered by version 2; the refresh it schedules runs afterwards
    assert!(!service.predict_json(Protocol::Rest, &features()).unwrap().is_successful());

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.version() < 3 { tokio::time::sleep(Duration::from_millis(5)).await; }
    }).await.unwrap();
    assert!(service.predict_json(Protocol::Rpc, &features()).unwrap().is_successful());
    assert_eq!(state.current().metadata.date.as_deref(), Some("v3"));
}

#[tokio::test]
async fn refresh_failures_never_reach_the_request() {
    let state = Arc::new(ModelStateManager::new(ModelSnapshot::new(Arc::new(ConstantModel(1.0)), 2, FeatureMetadata::default())));
    let registry = Arc::new(InMemoryRegistry::unreachable());
    let refresh = RefreshTrigger::new(state.clone(), registry.clone(), NAME, ALIAS, Duration::ZERO);
    let service = PredictionService::new(state.clone(), refresh.clone(), PredictionEngine::default());

    assert!(service.predict_json(Protocol::GraphQl, &features()).unwrap().is_successful());
    assert!(matches!(refresh.refresh_now().await, RefreshOutcome::Failed(_)));
    assert_eq!(state.version(), 2);

    registry.set_unreachable(false);
    registry.publish(NAME, ALIAS, artifact(5, 1.0));
    assert!(matches!(refresh.refresh_now().await, RefreshOutcome::Swapped { from: 2, to: 5 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_swaps_converge_on_highest_version() {
    let state = Arc::new(ModelStateManager::new(ModelSnapshot::new(Arc::new(ConstantModel(1.0)), 1, FeatureMetadata::default())));
    let mut tasks = Vec::new();
    for v in 2..=50u64 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let won = state.try_swap(ModelSnapshot::new(Arc::new(ConstantModel(1.0)), v, FeatureMetadata::default()));
            (v, won)
        }));
    }
    let mut observed = Vec::new();
    for t in tasks { observed.push(t.await.unwrap()); }
    assert_eq!(state.version(), 50);
    assert!(observed.iter().any(|&(v, won)| v == 50 && won));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_version_going_backwards() {
    let state = Arc::new(ModelStateManager::new(ModelSnapshot::new(Arc::new(ConstantModel(1.0)), 1, FeatureMetadata::default())));
    let reader = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..2_000 {
                let v = state.current().version;
                assert!(v >= last, "version went from {last} to {v}");
                last = v;
                tokio::task::yield_now().await;
            }
        })
    };
    let writers: Vec<_> = (0..4u64).map(|w| {
        let state = state.clone();
        tokio::spawn(async move {
            for i in 0..100u64 {
                let v = 2 + i * 4 + w;
                state.try_swap(ModelSnapshot::new(Arc::new(ConstantModel(1.0)), v, FeatureMetadata::default()));
                tokio::task::yield_now().await;
            }
        })
    }).collect();
    for w in writers { w.await.unwrap(); }
    reader.await.unwrap();
    assert_eq!(state.version(), 2 + 99 * 4 + 3);
}

#[tokio::test]
async fn shipped_fallback_bundle_loads() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("files");
    let snap = inference_gateway::LocalArtifactStore::new(dir).snapshot().await.unwrap();
    assert_eq!(snap.version, 0);
    assert_eq!(snap.model.kind(), "linear");
    assert_eq!(snap.metadata.mean.len(), 4);
    let state = Arc::new(ModelStateManager::new(snap));
    let refresh = RefreshTrigger::new(state.clone(), Arc::new(InMemoryRegistry::unreachable()), NAME, ALIAS, Duration::from_secs(60));
    let service = PredictionService::new(state, refresh, PredictionEngine::default());
    assert!(service.predict_json(Protocol::Rest, &features()).unwrap().is_successful());
}
