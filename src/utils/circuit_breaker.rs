use prometheus::IntGauge;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::IsTransient;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards calls to a remote dependency (ledger HTTP API, Kafka producer).
// Only transient failures count against the dependency: a 404 from the
// ledger proves the ledger is up.
//
// States:
// - Closed: calls pass through
// - Open: calls rejected immediately until `open_timeout` elapses
// - HalfOpen: trial calls allowed, `success_threshold` successes close it
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the `circuit_breaker_state` gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening
    pub failure_threshold: u32,
    /// Time to stay open before probing
    pub open_timeout: Duration,
    /// Successes needed to close from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    gauge: Option<IntGauge>,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            config,
            gauge: None,
        }
    }

    /// Mirror state transitions into a Prometheus gauge
    pub fn with_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(CircuitState::Closed.as_gauge());
        self.gauge = Some(gauge);
        self
    }

    fn transition(&self, state: &mut BreakerState, next: CircuitState) {
        state.state = next;
        if let Some(gauge) = &self.gauge {
            gauge.set(next.as_gauge());
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: IsTransient,
    {
        {
            let mut state = self.state.lock().await;
            if state.state == CircuitState::Open {
                let cooled_down = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                tracing::info!(breaker = self.name, "Circuit breaker transitioning to HalfOpen");
                self.transition(&mut state, CircuitState::HalfOpen);
                state.success_count = 0;
            }
        }

        match operation.await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(err) => {
                if err.is_transient() {
                    self.record_failure().await;
                } else {
                    self.record_success().await;
                }
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        breaker = self.name,
                        successes = state.success_count,
                        "Circuit breaker closing"
                    );
                    self.transition(&mut state, CircuitState::Closed);
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.opened_at = None;
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                tracing::warn!(
                    breaker = self.name,
                    failures = state.failure_count,
                    "Circuit breaker opening"
                );
                self.transition(&mut state, CircuitState::Open);
                state.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = self.name, "Trial call failed during half-open, reopening circuit");
                self.transition(&mut state, CircuitState::Open);
                state.opened_at = Some(Instant::now());
                state.success_count = 0;
            }
            _ => {}
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failure {
        transient: bool,
    }

    impl IsTransient for Failure {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn config(open_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            open_timeout,
            success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_transient_failures() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(60)));

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>(Failure { transient: true }) }).await;
            assert!(result.is_err());
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, Failure>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_permanent_failures_keep_circuit_closed() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(60)));

        for _ in 0..10 {
            let _ = cb.call(async { Err::<(), _>(Failure { transient: false }) }).await;
        }

        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_closes_after_successful_trial_calls() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(50)));

        for _ in 0..3 {
            let _ = cb.call(async { Err::<(), _>(Failure { transient: true }) }).await;
        }
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let result = cb.call(async { Ok::<_, Failure>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_gauge_tracks_transitions() {
        let gauge = IntGauge::new("test_breaker_state", "test").unwrap();
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(60))).with_gauge(gauge.clone());

        for _ in 0..3 {
            let _ = cb.call(async { Err::<(), _>(Failure { transient: true }) }).await;
        }

        assert_eq!(gauge.get(), CircuitState::Open.as_gauge());
    }
}
