use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker Pattern Implementation
// ============================================================================
//
// Guards writes to the broker. After `failure_threshold` consecutive failures
// the breaker opens and rejects calls without touching the broker. Once
// `timeout` has passed it lets calls through again (half-open) and closes
// after `success_threshold` consecutive successes.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Too many failures, requests blocked immediately
// - HalfOpen: Testing if the broker recovered
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long to stay open before probing again
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
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

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

struct Tracker {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    tracker: Arc<Mutex<Tracker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            tracker: Arc::new(Mutex::new(Tracker {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(e))
            }
        }
    }

    async fn admit(&self) -> bool {
        let mut tracker = self.tracker.lock().await;
        if tracker.state != CircuitState::Open {
            return true;
        }

        let cooled_down = tracker
            .opened_at
            .map(|at| at.elapsed() >= self.config.timeout)
            .unwrap_or(true);

        if cooled_down {
            tracing::info!(breaker = self.name, "Circuit breaker half-open, probing");
            tracker.state = CircuitState::HalfOpen;
            tracker.successes = 0;
        }
        cooled_down
    }

    async fn on_success(&self) {
        let mut tracker = self.tracker.lock().await;
        match tracker.state {
            CircuitState::HalfOpen => {
                tracker.successes += 1;
                if tracker.successes >= self.config.success_threshold {
                    tracing::info!(
                        breaker = self.name,
                        successes = tracker.successes,
                        "Circuit breaker closed"
                    );
                    tracker.state = CircuitState::Closed;
                    tracker.failures = 0;
                    tracker.successes = 0;
                    tracker.opened_at = None;
                }
            }
            CircuitState::Closed => tracker.failures = 0,
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut tracker = self.tracker.lock().await;
        tracker.failures += 1;

        let reopen = match tracker.state {
            CircuitState::Closed => tracker.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if reopen {
            tracing::warn!(
                breaker = self.name,
                failures = tracker.failures,
                "Circuit breaker opened"
            );
            tracker.state = CircuitState::Open;
            tracker.successes = 0;
            tracker.opened_at = Some(Instant::now());
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.tracker.lock().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.tracker.lock().await.failures
    }

    /// Force the circuit closed
    pub async fn reset(&self) {
        let mut tracker = self.tracker.lock().await;
        tracing::info!(breaker = self.name, "Circuit breaker manually reset");
        tracker.state = CircuitState::Closed;
        tracker.failures = 0;
        tracker.successes = 0;
        tracker.opened_at = None;
    }
}
