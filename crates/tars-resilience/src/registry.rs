use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tars_models::breaker::CircuitState;
use tars_models::metrics::MetricsSink;
use tracing::debug;

use crate::breaker::{BreakerSettings, CircuitBreaker};
use crate::error::BreakerError;

/// Named circuit breakers, created lazily on first use of a dependency name.
///
/// Construct one per process and share it (behind an `Arc`) with every
/// protected call site. Tests build their own isolated registry.
pub struct BreakerRegistry {
    settings: BreakerSettings,
    metrics: Arc<dyn MetricsSink>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            settings,
            metrics,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it if this is the first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = breakers.get(name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have created it between the two locks.
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }
        debug!(breaker = %name, "Creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(
            name,
            self.settings.clone(),
            Arc::clone(&self.metrics),
        ));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Run `operation` through the breaker named `name`.
    pub async fn call<F, Fut, T, E>(&self, name: &str, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get(name).call(operation).await
    }

    /// State of the named breaker, or `None` if it was never used.
    pub fn state(&self, name: &str) -> Option<CircuitState> {
        let breaker = {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            breakers.get(name).cloned()
        };
        breaker.map(|b| b.state())
    }

    /// Snapshot of every known breaker's state, sorted by name.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let breakers: Vec<Arc<CircuitBreaker>> = {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            breakers.values().cloned().collect()
        };
        let mut states: Vec<_> = breakers
            .iter()
            .map(|b| (b.name().to_string(), b.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn len(&self) -> usize {
        self.breakers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tars_models::metrics::{AgentOutcome, NoopMetrics};
    use tars_models::{AgentType, Recommendation};

    #[derive(Default)]
    struct TransitionLog(Mutex<Vec<(String, CircuitState, CircuitState)>>);

    impl MetricsSink for TransitionLog {
        fn record_request(&self, _symbol: &str) {}
        fn record_agent_result(&self, _t: AgentType, _e: Duration, _o: AgentOutcome<'_>) {}
        fn record_recommendation(&self, _r: &Recommendation) {}
        fn record_breaker_transition(&self, name: &str, from: CircuitState, to: CircuitState) {
            self.0.lock().unwrap().push((name.to_string(), from, to));
        }
    }

    fn settings() -> BreakerSettings {
        BreakerSettings {
            min_requests: 5,
            failure_ratio: 0.5,
            half_open_max_requests: 1,
            open_timeout: Duration::from_secs(60),
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn get_returns_same_breaker_for_name() {
        let registry = BreakerRegistry::new(settings(), Arc::new(NoopMetrics));
        assert!(registry.is_empty());

        let a = registry.get("fmp");
        let b = registry.get("fmp");
        let c = registry.get("newsapi");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_creation_yields_one_breaker() {
        let registry = Arc::new(BreakerRegistry::new(settings(), Arc::new(NoopMetrics)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get("shared"))
            })
            .collect();
        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(breakers.iter().all(|b| Arc::ptr_eq(b, &breakers[0])));
    }

    #[tokio::test]
    async fn breakers_are_isolated_by_name() {
        let registry = BreakerRegistry::new(settings(), Arc::new(NoopMetrics));
        for _ in 0..5 {
            let _ = registry
                .call("flaky", || async { Err::<(), _>("down") })
                .await;
        }
        assert_eq!(registry.state("flaky"), Some(CircuitState::Open));

        let ok = registry
            .call("healthy", || async { Ok::<_, &'static str>(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);
        assert_eq!(registry.state("healthy"), Some(CircuitState::Closed));
        assert_eq!(registry.state("never_used"), None);
        assert_eq!(
            registry.states(),
            vec![
                ("flaky".to_string(), CircuitState::Open),
                ("healthy".to_string(), CircuitState::Closed),
            ]
        );
    }

    #[tokio::test]
    async fn transitions_are_reported_to_metrics() {
        let log = Arc::new(TransitionLog::default());
        let registry = BreakerRegistry::new(settings(), log.clone());
        for _ in 0..5 {
            let _ = registry.call("fmp", || async { Err::<(), _>("503") }).await;
        }

        let transitions = log.0.lock().unwrap().clone();
        assert_eq!(
            transitions,
            vec![("fmp".to_string(), CircuitState::Closed, CircuitState::Open)]
        );
    }
}
