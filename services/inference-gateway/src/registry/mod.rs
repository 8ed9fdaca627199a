//! Registry clients: where candidate artifacts come from.

use async_trait::async_trait;
use crate::error::Result;

mod http;
mod local;
mod memory;

pub use http::{HttpRegistry, HttpRegistryOptions};
pub use local::{LocalArtifactStore, MODEL_FILE, METADATA_FILE};
pub use memory::InMemoryRegistry;

/// A fetched artifact. `metadata_json` is `None` when the metadata document could not be read;
/// callers keep whatever metadata they already trust.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub version: u64,
    pub metadata_json: Option<String>,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Version currently published under `alias`. `ArtifactNotFound` when nothing is published.
    async fn head_version(&self, name: &str, alias: &str) -> Result<u64>;
    async fn load(&self, name: &str, alias: &str) -> Result<Artifact>;
    /// The feature metadata document on its own, so statistics stay reachable when the model
    /// artifact is not. `Ok(None)` when no document is published.
    async fn metadata(&self, name: &str, alias: &str) -> Result<Option<String>>;
}
