use std::collections::HashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use crate::error::{GatewayError, Result};
use super::{Artifact, Registry};

/// Registry kept in process memory. Tests publish versions into it; the offline demo mode runs it
/// permanently unreachable so the gateway serves the bundled artifact.
#[derive(Default)]
pub struct InMemoryRegistry {
    published: RwLock<HashMap<(String, String), Artifact>>,
    unreachable: RwLock<bool>,
    loads: std::sync::atomic::AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn unreachable() -> Self { let r = Self::default(); r.set_unreachable(true); r }

    pub fn publish(&self, name: &str, alias: &str, artifact: Artifact) {
        self.published.write().insert((name.to_string(), alias.to_string()), artifact);
    }

    pub fn set_unreachable(&self, down: bool) { *self.unreachable.write() = down; }

    /// Number of full `load` calls served, for asserting the refresh path skipped a fetch.
    pub fn load_count(&self) -> usize { self.loads.load(std::sync::atomic::Ordering::SeqCst) }

    fn lookup(&self, name: &str, alias: &str) -> Result<Artifact> {
        if *self.unreachable.read() { return Err(GatewayError::RegistryUnavailable("in-memory registry marked unreachable".into())); }
        self.published.read().get(&(name.to_string(), alias.to_string())).cloned()
            .ok_or_else(|| GatewayError::ArtifactNotFound { name: name.to_string(), alias: alias.to_string() })
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn head_version(&self, name: &str, alias: &str) -> Result<u64> { self.lookup(name, alias).map(|a| a.version) }

    async fn load(&self, name: &str, alias: &str) -> Result<Artifact> {
        self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.lookup(name, alias)
    }

    async fn metadata(&self, name: &str, alias: &str) -> Result<Option<String>> { self.lookup(name, alias).map(|a| a.metadata_json) }
}
