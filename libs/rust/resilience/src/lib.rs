//! Resilience utilities for outbound calls: retry with exponential backoff + circuit breaker.
//! Used by the registry client so a slow or dead registry degrades to "keep serving the old model".
use std::time::{Duration, Instant};
use thiserror::Error;
use parking_lot::Mutex;
use futures::Future;
use tracing::{warn, debug};
use prometheus::{register_int_counter, IntCounter};
use once_cell::sync::Lazy;
use rand::{thread_rng, Rng};

static RETRY_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("hitserve_resilience_retry_attempts_total", "Total retry attempts executed")
        .expect("register retry counter")
});

static CIRCUIT_OPEN: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("hitserve_resilience_circuit_open_total", "Number of times circuit transitioned to open")
        .expect("register circuit counter")
});

#[derive(Debug, Error)]
pub enum ResilienceError { #[error("circuit open")] CircuitOpen }

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl Default for RetryPolicy { fn default() -> Self { Self { attempts: 3, base_delay: Duration::from_millis(50), max_delay: Duration::from_millis(1000), jitter: 0.25 } } }

impl RetryPolicy {
    fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt as i32));
        let delay = std::cmp::min(exp, self.max_delay);
        if self.jitter <= 0.0 { return delay; }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter) as i64;
        let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

/// Runs `f` up to `policy.attempts` times. `retryable` decides whether an error is worth another attempt;
/// a non-retryable error is returned immediately.
pub async fn retry_async<F, Fut, T, E, R>(policy: &RetryPolicy, mut f: F, retryable: R) -> Result<T, E>
where F: FnMut(usize) -> Fut, Fut: Future<Output = Result<T, E>>, R: Fn(&E) -> bool {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        RETRY_ATTEMPTS.inc();
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 >= attempts || !retryable(&e) => return Err(e),
            Err(_) => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

pub struct CircuitBreaker {
    state: Mutex<State>,
    half_open_after: Duration,
    failure_threshold: u32,
}

struct State { failures: u32, opened_at: Option<Instant>, trial: bool }

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, half_open_after: Duration) -> Self { Self { state: Mutex::new(State { failures: 0, opened_at: None, trial: false }), half_open_after, failure_threshold: failure_threshold.max(1) } }

    /// Returns false while open. Once `half_open_after` has elapsed a single trial call is let through.
    fn allow(&self) -> bool {
        let mut st = self.state.lock();
        if let Some(opened) = st.opened_at {
            if opened.elapsed() >= self.half_open_after && !st.trial { debug!("half-open trial"); st.trial = true; return true; }
            return false;
        }
        true
    }

    fn record_success(&self) { let mut st = self.state.lock(); st.failures = 0; st.opened_at = None; st.trial = false; }

    fn record_failure(&self) {
        let mut st = self.state.lock();
        st.failures += 1;
        if st.trial {
            // failed trial re-opens for another full window
            st.trial = false;
            st.opened_at = Some(Instant::now());
            CIRCUIT_OPEN.inc();
            warn!("circuit re-opened after failed trial");
        } else if st.failures >= self.failure_threshold && st.opened_at.is_none() {
            st.opened_at = Some(Instant::now());
            CIRCUIT_OPEN.inc();
            warn!(failures = st.failures, "circuit opened");
        }
    }

    /// Runs `f` unless the circuit is open. Only errors for which `trips` holds count as failures;
    /// any other outcome proves the dependency is reachable and closes the circuit.
    pub async fn call<F, Fut, T, E, P>(&self, f: F, trips: P) -> Result<Result<T, E>, ResilienceError>
    where F: FnOnce() -> Fut, Fut: Future<Output = Result<T, E>>, P: Fn(&E) -> bool {
        if !self.allow() { return Err(ResilienceError::CircuitOpen); }
        let res = f().await;
        match &res {
            Err(e) if trips(e) => self.record_failure(),
            _ => self.record_success(),
        }
        Ok(res)
    }
}
