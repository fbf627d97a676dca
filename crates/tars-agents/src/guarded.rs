//! Resilience decorator for any [`Agent`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tars_models::analysis::{AgentType, Analysis};
use tars_models::breaker::CircuitState;
use tars_resilience::{retry, BreakerError, BreakerRegistry, HealthCache, RetryError, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{Agent, AgentMetadata};
use crate::error::AgentError;

/// Wraps an agent with the breaker for its upstream dependency, retry with
/// backoff inside the breaker, and a TTL cache over `is_available`.
///
/// A whole retry sequence counts as one breaker request. An open breaker
/// makes the agent report itself unavailable.
pub struct GuardedAgent<A> {
    inner: A,
    dependency: String,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    health: HealthCache,
}

impl<A: Agent> GuardedAgent<A> {
    pub fn new(
        inner: A,
        dependency: &str,
        breakers: Arc<BreakerRegistry>,
        retry: RetryPolicy,
        health_ttl: Duration,
    ) -> Self {
        Self {
            inner,
            dependency: dependency.to_string(),
            breakers,
            retry,
            health: HealthCache::new(health_ttl),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Name of the breaker guarding this agent.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Drop the cached availability so the next check probes again.
    pub fn invalidate_health(&self) {
        self.health.invalidate();
    }

    fn map_error(&self, err: BreakerError<RetryError<AgentError>>) -> AgentError {
        match err {
            BreakerError::Open(name) => {
                self.health.set(false);
                AgentError::Unavailable(format!("breaker open for {name}"))
            }
            BreakerError::TooManyRequests(name) => {
                AgentError::Unavailable(format!("too many requests to {name}"))
            }
            BreakerError::Operation(RetryError::Cancelled { .. }) => AgentError::Cancelled,
            BreakerError::Operation(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                if attempts <= 1 {
                    last_error
                } else {
                    AgentError::RetryExhausted {
                        attempts,
                        last_error: Box::new(last_error),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<A: Agent> Agent for GuardedAgent<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn agent_type(&self) -> AgentType {
        self.inner.agent_type()
    }

    fn metadata(&self) -> AgentMetadata {
        self.inner.metadata()
    }

    async fn is_available(&self, cancel: &CancellationToken) -> bool {
        if self.breakers.state(&self.dependency) == Some(CircuitState::Open) {
            debug!(agent = %self.inner.name(), breaker = %self.dependency, "Breaker open, agent unavailable");
            return false;
        }
        self.health
            .get_or_probe(|| self.inner.is_available(cancel))
            .await
    }

    async fn analyze(&self, cancel: &CancellationToken, symbol: &str) -> Result<Analysis, AgentError> {
        self.breakers
            .call(&self.dependency, || {
                retry(&self.retry, cancel, || self.inner.analyze(cancel, symbol))
            })
            .await
            .map_err(|e| self.map_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAgent;
    use tars_models::metrics::NoopMetrics;
    use tars_resilience::BreakerSettings;

    fn registry() -> Arc<BreakerRegistry> {
        Arc::new(BreakerRegistry::new(
            BreakerSettings {
                min_requests: 5,
                failure_ratio: 0.5,
                half_open_max_requests: 1,
                open_timeout: Duration::from_secs(60),
                interval: Duration::ZERO,
            },
            Arc::new(NoopMetrics),
        ))
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn retries_inside_breaker() {
        let breakers = registry();
        let guarded = GuardedAgent::new(
            MockAgent::flaky(AgentType::News, 2, 40.0, 70.0),
            "newsapi",
            breakers.clone(),
            fast_retry(3),
            Duration::from_secs(30),
        );

        let analysis = guarded
            .analyze(&CancellationToken::new(), "AAPL")
            .await
            .unwrap();
        assert_eq!(analysis.score, 40.0);
        assert_eq!(guarded.inner().calls(), 3);
        let counts = breakers.get("newsapi").counts();
        assert_eq!(counts.requests, 1);
        assert_eq!(counts.total_successes, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_carry_attempt_count() {
        let guarded = GuardedAgent::new(
            MockAgent::failing(AgentType::Technical, "503"),
            "quotes",
            registry(),
            fast_retry(3),
            Duration::from_secs(30),
        );
        let err = guarded
            .analyze(&CancellationToken::new(), "AAPL")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(err.to_string(), "gave up after 3 attempt(s): Upstream error: 503");
    }

    #[tokio::test]
    async fn single_attempt_returns_inner_error() {
        let guarded = GuardedAgent::new(
            MockAgent::failing(AgentType::Technical, "503"),
            "quotes",
            registry(),
            RetryPolicy::no_retry(),
            Duration::from_secs(30),
        );
        let err = guarded
            .analyze(&CancellationToken::new(), "AAPL")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Upstream(ref m) if m == "503"));
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_and_reports_unavailable() {
        let breakers = registry();
        let guarded = GuardedAgent::new(
            MockAgent::failing(AgentType::Fundamental, "down"),
            "fmp",
            breakers.clone(),
            RetryPolicy::no_retry(),
            Duration::from_secs(30),
        );
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            let _ = guarded.analyze(&cancel, "AAPL").await;
        }
        assert_eq!(breakers.state("fmp"), Some(CircuitState::Open));
        assert_eq!(guarded.inner().calls(), 5);

        let err = guarded.analyze(&cancel, "AAPL").await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));
        assert_eq!(err.to_string(), "unavailable: breaker open for fmp");
        assert_eq!(guarded.inner().calls(), 5);
        assert!(!guarded.is_available(&cancel).await);
    }

    #[tokio::test]
    async fn availability_is_cached_until_invalidated() {
        let guarded = GuardedAgent::new(
            MockAgent::succeeding(AgentType::News, 10.0, 50.0),
            "newsapi",
            registry(),
            RetryPolicy::no_retry(),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();

        assert!(guarded.is_available(&cancel).await);
        assert!(guarded.is_available(&cancel).await);
        assert_eq!(guarded.inner().availability_checks(), 1);

        guarded.inner().set_available(false);
        assert!(guarded.is_available(&cancel).await);
        guarded.invalidate_health();
        assert!(!guarded.is_available(&cancel).await);
        assert_eq!(guarded.inner().availability_checks(), 2);
    }

    #[tokio::test]
    async fn cancellation_during_backoff() {
        let guarded = GuardedAgent::new(
            MockAgent::failing(AgentType::News, "flaky"),
            "newsapi",
            registry(),
            RetryPolicy::new(5, Duration::from_secs(30), Duration::from_secs(30)),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = guarded.analyze(&cancel, "AAPL").await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(guarded.inner().calls(), 1);
    }
}
