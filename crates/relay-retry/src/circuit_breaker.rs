//! Sliding-window circuit breaker guarding the broker connection.
//!
//! State transitions:
//! - Closed → Open: consecutive failures reach the threshold, or the error
//!   rate over the sliding window exceeds the configured ratio.
//! - Open → HalfOpen: after the configured timeout elapses.
//! - HalfOpen → Closed: success count reaches the success threshold.
//! - HalfOpen → Open: any failure.
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    pub error_rate_threshold: f64,
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            error_rate_threshold: 0.5,
            window_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<State>>,
}

struct State {
    current: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    window: VecDeque<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open")]
    Open,
    #[error("call failed: {0}")]
    CallFailed(String),
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                current: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                window: VecDeque::with_capacity(config.window_size),
            })),
            config,
        }
    }

    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if self.should_reject_call() {
            return Err(CircuitBreakerError::Open);
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::CallFailed(e.to_string()))
            }
        }
    }

    /// Exposed so callers that need the typed error of their own operation
    /// (rather than the `Display`-erased one `call` produces) can drive the
    /// breaker manually: check `should_reject`, run the operation, then
    /// report the outcome via `record_success`/`record_failure`.
    pub fn should_reject(&self) -> bool {
        self.should_reject_call()
    }

    pub fn record_success(&self) {
        self.record_success_inner()
    }

    pub fn record_failure(&self) {
        self.record_failure_inner()
    }

    fn should_reject_call(&self) -> bool {
        let mut state = self.state.write();
        match state.current {
            CircuitState::Open => {
                if let Some(opened_at) = state.opened_at {
                    if opened_at.elapsed() >= self.config.timeout {
                        info!("circuit breaker: open -> half-open");
                        state.current = CircuitState::HalfOpen;
                        state.consecutive_successes = 0;
                        state.consecutive_failures = 0;
                        false
                    } else {
                        true
                    }
                } else {
                    true
                }
            }
            CircuitState::HalfOpen | CircuitState::Closed => false,
        }
    }

    fn record_success_inner(&self) {
        let mut state = self.state.write();
        state.consecutive_successes += 1;
        state.consecutive_failures = 0;
        self.add_to_window(&mut state, true);

        if state.current == CircuitState::HalfOpen && state.consecutive_successes >= self.config.success_threshold {
            info!("circuit breaker: half-open -> closed");
            state.current = CircuitState::Closed;
        }
    }

    fn record_failure_inner(&self) {
        let mut state = self.state.write();
        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        self.add_to_window(&mut state, false);

        match state.current {
            CircuitState::Closed => {
                let error_rate = self.calculate_error_rate(&state);
                if state.consecutive_failures >= self.config.failure_threshold || error_rate >= self.config.error_rate_threshold {
                    warn!(failures = state.consecutive_failures, error_rate, "circuit breaker: closed -> open");
                    state.current = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("circuit breaker: half-open -> open, probe failed");
                state.current = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    fn add_to_window(&self, state: &mut State, success: bool) {
        if state.window.len() >= self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(success);
    }

    fn calculate_error_rate(&self, state: &State) -> f64 {
        if state.window.is_empty() {
            return 0.0;
        }
        let failures = state.window.iter().filter(|ok| !**ok).count();
        failures as f64 / state.window.len() as f64
    }

    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    pub fn error_rate(&self) -> f64 {
        let state = self.state.read();
        self.calculate_error_rate(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_on_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 3, ..Default::default() });
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        let result = cb.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_opens_after_timeout_then_closes_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
            ..Default::default()
        });
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(80)).await;
        for _ in 0..2 {
            let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn error_rate_opens_circuit_independent_of_consecutive_count() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 100,
            error_rate_threshold: 0.5,
            window_size: 10,
            ..Default::default()
        });
        for _ in 0..6 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        for _ in 0..4 {
            let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
