//! Background refresh: poll the registry alias and install newer versions without touching the
//! request path.

use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::error::GatewayError;
use crate::metrics::SERVING_METRICS;
use crate::registry::Registry;
use crate::state::{snapshot_from_artifact, ModelStateManager};

#[derive(Debug)]
pub enum RefreshOutcome {
    UpToDate { version: u64 },
    Swapped { from: u64, to: u64 },
    /// A concurrent refresh installed an equal or newer version first.
    Lost { candidate: u64 },
    Failed(GatewayError),
}

impl RefreshOutcome {
    fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::UpToDate { .. } => "up_to_date",
            RefreshOutcome::Swapped { .. } => "swapped",
            RefreshOutcome::Lost { .. } => "lost",
            RefreshOutcome::Failed(e) => e.kind(),
        }
    }
}

#[derive(Clone)]
pub struct RefreshTrigger { inner: Arc<Inner> }

struct Inner {
    state: Arc<ModelStateManager>,
    registry: Arc<dyn Registry>,
    name: String,
    alias: String,
    min_interval: Duration,
    last_started: Mutex<Option<Instant>>,
}

impl RefreshTrigger {
    pub fn new(state: Arc<ModelStateManager>, registry: Arc<dyn Registry>, name: impl Into<String>, alias: impl Into<String>, min_interval: Duration) -> Self {
        Self { inner: Arc::new(Inner { state, registry, name: name.into(), alias: alias.into(), min_interval, last_started: Mutex::new(None) }) }
    }

    /// Fire-and-forget. Returns the spawned task's handle (callers normally drop it) or `None`
    /// when the minimum interval since the last refresh has not elapsed.
    pub fn trigger(&self) -> Option<JoinHandle<RefreshOutcome>> {
        if !self.claim_slot() { return None; }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => { warn!("refresh requested outside a runtime, skipped"); return None; }
        };
        let this = self.clone();
        Some(handle.spawn(async move { this.refresh_now().await }))
    }

    fn claim_slot(&self) -> bool {
        if self.inner.min_interval.is_zero() { return true; }
        let mut last = self.inner.last_started.lock();
        match *last {
            Some(t) if t.elapsed() < self.inner.min_interval => false,
            _ => { *last = Some(Instant::now()); true }
        }
    }

    /// One refresh cycle. Nothing is locked while the registry is contacted; only the final
    /// install is synchronised (inside `try_swap`).
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let outcome = self.cycle().await;
        SERVING_METRICS.refresh_total.with_label_values(&[outcome.label()]).inc();
        match &outcome {
            RefreshOutcome::Failed(e) => warn!(error=%e, kind = e.kind(), name = %self.inner.name, alias = %self.inner.alias, "model refresh failed, keeping current model"),
            RefreshOutcome::Swapped { from, to } => info!(from, to, "model refreshed"),
            other => debug!(outcome = ?other, "model refresh"),
        }
        outcome
    }

    async fn cycle(&self) -> RefreshOutcome {
        let Inner { state, registry, name, alias, .. } = &*self.inner;
        let current = state.version();
        let head = match registry.head_version(name, alias).await {
            Ok(v) => v,
            Err(e) => return RefreshOutcome::Failed(e),
        };
        if head <= current { return RefreshOutcome::UpToDate { version: current }; }
        let artifact = match registry.load(name, alias).await {
            Ok(a) => a,
            Err(e) => return RefreshOutcome::Failed(e),
        };
        let candidate = match snapshot_from_artifact(&artifact, &state.metadata_for(None)) {
            Ok(s) => s,
            Err(e) => return RefreshOutcome::Failed(e),
        };
        let version = candidate.version;
        if state.try_swap(candidate) { RefreshOutcome::Swapped { from: current, to: version } } else { RefreshOutcome::Lost { candidate: version } }
    }

    /// Periodic polling in addition to the per-request trigger.
    pub fn spawn_poller(&self, every: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let _ = this.refresh_now().await;
            }
        })
    }
}
