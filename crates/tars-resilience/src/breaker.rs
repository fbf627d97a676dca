//! Circuit breaker for one named external dependency.
//!
//! ## States
//! - **Closed**: calls pass through. Once the window holds at least
//!   `min_requests` requests and the failure ratio reaches `failure_ratio`,
//!   the breaker opens.
//! - **Open**: calls fail fast with [`BreakerError::Open`] until
//!   `open_timeout` elapses, then the breaker goes half-open.
//! - **HalfOpen**: up to `half_open_max_requests` trial calls are let
//!   through; extra calls get [`BreakerError::TooManyRequests`]. That many
//!   consecutive successes close the breaker, any failure reopens it.
//!
//! Every state change starts a new generation and clears the counts. A call
//! that completes after its generation ended is not counted. A call whose
//! future is dropped before it finishes (timeout, cancellation) counts as a
//! failure.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tars_models::breaker::{BreakerCounts, CircuitState};
use tars_models::config::BreakerConfig;
use tars_models::metrics::MetricsSink;
use tracing::{debug, warn};

use crate::error::BreakerError;

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    pub min_requests: u32,
    pub failure_ratio: f64,
    pub half_open_max_requests: u32,
    pub open_timeout: Duration,
    /// Closed-state counts are cleared every `interval`. Zero never clears.
    pub interval: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            min_requests: config.min_requests,
            failure_ratio: config.failure_ratio,
            half_open_max_requests: config.half_open_max_requests,
            open_timeout: Duration::from_secs(config.open_timeout_seconds),
            interval: Duration::from_secs(config.interval_seconds),
        }
    }
}

type Transition = (CircuitState, CircuitState);

struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: BreakerCounts,
    expiry: Option<Instant>,
}

impl BreakerInner {
    fn new(settings: &BreakerSettings, now: Instant) -> Self {
        let mut inner = Self {
            state: CircuitState::Closed,
            generation: 0,
            counts: BreakerCounts::default(),
            expiry: None,
        };
        inner.new_generation(settings, now);
        inner
    }

    fn current_state(
        &mut self,
        settings: &BreakerSettings,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> (CircuitState, u64) {
        match self.state {
            CircuitState::Closed => {
                if self.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(settings, now);
                }
            }
            CircuitState::Open => {
                if self.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(CircuitState::HalfOpen, settings, now, transitions);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (self.state, self.generation)
    }

    fn set_state(
        &mut self,
        state: CircuitState,
        settings: &BreakerSettings,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        if self.state == state {
            return;
        }
        let from = self.state;
        self.state = state;
        self.new_generation(settings, now);
        transitions.push((from, state));
    }

    fn new_generation(&mut self, settings: &BreakerSettings, now: Instant) {
        self.generation += 1;
        self.counts.clear();
        self.expiry = match self.state {
            CircuitState::Closed if settings.interval.is_zero() => None,
            CircuitState::Closed => Some(now + settings.interval),
            CircuitState::Open => Some(now + settings.open_timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn on_success(
        &mut self,
        settings: &BreakerSettings,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        match self.state {
            CircuitState::Closed => self.counts.on_success(),
            CircuitState::HalfOpen => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= settings.half_open_max_requests {
                    self.set_state(CircuitState::Closed, settings, now, transitions);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(
        &mut self,
        settings: &BreakerSettings,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        match self.state {
            CircuitState::Closed => {
                self.counts.on_failure();
                if self.counts.requests >= settings.min_requests
                    && self.counts.failure_ratio() >= settings.failure_ratio
                {
                    self.set_state(CircuitState::Open, settings, now, transitions);
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Open, settings, now, transitions);
            }
            CircuitState::Open => {}
        }
    }
}

/// Failure-isolation state machine for one dependency.
///
/// The breaker never suspends: it either admits the call or rejects it
/// synchronously. The lock is never held across the wrapped operation.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    metrics: Arc<dyn MetricsSink>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, mut settings: BreakerSettings, metrics: Arc<dyn MetricsSink>) -> Self {
        settings.half_open_max_requests = settings.half_open_max_requests.max(1);
        let inner = BreakerInner::new(&settings, Instant::now());
        Self {
            name: name.to_string(),
            settings,
            metrics,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state. An open breaker whose cooldown has elapsed reports
    /// (and becomes) half-open.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let state = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.current_state(&self.settings, Instant::now(), &mut transitions).0
        };
        self.report(&transitions);
        state
    }

    pub fn counts(&self) -> BreakerCounts {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
    }

    /// Run `operation` if the breaker admits it, recording the outcome.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = Admission {
            breaker: self,
            generation: self.before_request()?,
            settled: false,
        };
        let result = operation().await;
        admission.settle(result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    fn before_request<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let (state, generation) =
                inner.current_state(&self.settings, Instant::now(), &mut transitions);
            match state {
                CircuitState::Open => Err(BreakerError::Open(self.name.clone())),
                CircuitState::HalfOpen
                    if inner.counts.requests >= self.settings.half_open_max_requests =>
                {
                    Err(BreakerError::TooManyRequests(self.name.clone()))
                }
                _ => {
                    inner.counts.on_request();
                    Ok(generation)
                }
            }
        };
        self.report(&transitions);
        if admitted.is_err() {
            debug!(breaker = %self.name, "Call rejected by circuit breaker");
        }
        admitted
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let (_, generation) = inner.current_state(&self.settings, now, &mut transitions);
            if generation == before {
                if success {
                    inner.on_success(&self.settings, now, &mut transitions);
                } else {
                    inner.on_failure(&self.settings, now, &mut transitions);
                }
            }
        }
        self.report(&transitions);
    }

    fn report(&self, transitions: &[Transition]) {
        for (from, to) in transitions {
            warn!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state change");
            self.metrics.record_breaker_transition(&self.name, *from, *to);
        }
    }
}

/// An admitted request. Dropped unsettled, it is recorded as a failure so an
/// abandoned call still frees its half-open slot.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(breaker = %self.breaker.name, "Call abandoned before completion");
            self.breaker.after_request(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tars_models::metrics::NoopMetrics;

    fn settings(open_timeout: Duration) -> BreakerSettings {
        BreakerSettings {
            min_requests: 5,
            failure_ratio: 0.5,
            half_open_max_requests: 2,
            open_timeout,
            interval: Duration::ZERO,
        }
    }

    fn breaker(open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new("upstream", settings(open_timeout), Arc::new(NoopMetrics))
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        breaker.call(|| async { Ok::<_, &'static str>(1) }).await
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        breaker.call(|| async { Err::<u32, _>("boom") }).await
    }

    #[tokio::test]
    async fn starts_closed_and_passes_through() {
        let breaker = breaker(Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker).await.unwrap(), 1);
        assert_eq!(breaker.counts().total_successes, 1);
    }

    #[tokio::test]
    async fn operation_error_is_wrapped() {
        let breaker = breaker(Duration::from_secs(60));
        let err = fail(&breaker).await.unwrap_err();
        assert!(matches!(err, BreakerError::Operation("boom")));
        assert!(!err.is_rejected());
    }

    #[tokio::test]
    async fn does_not_trip_below_min_requests() {
        let breaker = breaker(Duration::from_secs(60));
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn trips_at_half_failures_over_five_requests() {
        let breaker = breaker(Duration::from_secs(60));
        // 3 of 5 failures: ratio 0.6 once the fifth request lands.
        let _ = succeed(&breaker).await;
        let _ = succeed(&breaker).await;
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_breaker_does_not_invoke_operation() {
        let breaker = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open(ref name)) if name == "upstream"));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_after_cooldown_and_closes_on_success() {
        let breaker = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts(), BreakerCounts::default());
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open(_))));
    }

    #[tokio::test]
    async fn half_open_limits_concurrent_trials() {
        let breaker = Arc::new(breaker(Duration::from_millis(20)));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let mut trials = Vec::new();
        for _ in 0..2 {
            let breaker = Arc::clone(&breaker);
            let mut rx = release_rx.clone();
            trials.push(tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = rx.wait_for(|released| *released).await;
                        Ok::<_, &'static str>(())
                    })
                    .await
            }));
        }
        // Let both trials get admitted before the third call.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let third = succeed(&breaker).await;
        assert!(matches!(third, Err(BreakerError::TooManyRequests(_))));
        assert!(third.unwrap_err().is_rejected());

        release_tx.send(true).unwrap();
        for trial in trials {
            trial.await.unwrap().unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn interval_clears_closed_counts() {
        let mut settings = settings(Duration::from_secs(60));
        settings.interval = Duration::from_millis(20);
        let breaker = CircuitBreaker::new("upstream", settings, Arc::new(NoopMetrics));

        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.counts().total_failures, 4);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.counts().requests, 0);

        // A single failure after the reset is not enough to trip.
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn abandoned_calls_count_as_failures() {
        let breaker = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let hung = breaker.call(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, &'static str>(())
            });
            assert!(tokio::time::timeout(Duration::from_millis(5), hung).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn abandoned_half_open_trial_reopens_then_recovers() {
        let breaker = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let hung = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, &'static str>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(5), hung).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn settings_from_config() {
        let settings = BreakerSettings::from(&BreakerConfig::default());
        assert_eq!(settings.min_requests, 5);
        assert_eq!(settings.failure_ratio, 0.5);
        assert_eq!(settings.open_timeout, Duration::from_secs(60));
    }

    #[test]
    fn zero_half_open_limit_is_raised_to_one() {
        let mut s = settings(Duration::from_secs(1));
        s.half_open_max_requests = 0;
        let breaker = CircuitBreaker::new("x", s, Arc::new(NoopMetrics));
        assert_eq!(breaker.settings().half_open_max_requests, 1);
    }
}
