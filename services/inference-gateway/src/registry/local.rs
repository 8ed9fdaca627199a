use std::path::{Path, PathBuf};
use crate::error::{GatewayError, Result};
use crate::model::{decode_artifact, FeatureMetadata, ModelSnapshot};

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "data.json";

/// The artifact bundled with the image. Always served as version 0.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore { dir: PathBuf }

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
    pub fn dir(&self) -> &Path { &self.dir }

    pub async fn metadata(&self) -> Result<FeatureMetadata> {
        let path = self.dir.join(METADATA_FILE);
        let text = tokio::fs::read_to_string(&path).await
            .map_err(|e| GatewayError::SerializationFailure(format!("read {}: {e}", path.display())))?;
        FeatureMetadata::from_json(&text)
    }

    /// Builds the version-0 snapshot. Metadata problems degrade to empty metadata, the model
    /// itself must decode.
    pub async fn snapshot(&self) -> Result<ModelSnapshot> {
        let path = self.dir.join(MODEL_FILE);
        let bytes = tokio::fs::read(&path).await
            .map_err(|e| GatewayError::SerializationFailure(format!("read {}: {e}", path.display())))?;
        let model = decode_artifact(&bytes)?;
        let metadata = match self.metadata().await {
            Ok(m) => m,
            Err(e) => { tracing::warn!(error=%e, "bundled metadata unusable, serving without it"); FeatureMetadata::default() }
        };
        Ok(ModelSnapshot::new(model, 0, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_bundled_pair_as_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE), r#"{"kind":"constant","score":1.0}"#).unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), r#"{"feature_names":["speechiness","energy","danceability","acousticness"]}"#).unwrap();
        let snap = LocalArtifactStore::new(dir.path()).snapshot().await.unwrap();
        assert_eq!(snap.version, 0);
        assert_eq!(snap.metadata.feature_names.len(), 4);
    }

    #[tokio::test]
    async fn missing_metadata_is_tolerated_missing_model_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.snapshot().await.is_err());
        std::fs::write(dir.path().join(MODEL_FILE), r#"{"kind":"constant","score":-1.0}"#).unwrap();
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.metadata, FeatureMetadata::default());
    }
}
