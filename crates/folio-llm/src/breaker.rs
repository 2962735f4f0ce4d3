//! Circuit breaker around an outbound dependency.
//!
//! One instance per dependency. State lives under a `std::sync::Mutex`, so a
//! transition is observed — and its event emitted — exactly once.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use folio_core::events::{CircuitEvent, Event, EventBus};
use tracing::{info, warn};

use crate::provider::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// How long the breaker stays open before a half-open probe.
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_ms: 1000,
        }
    }
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    events: Arc<EventBus>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            events,
        }
    }

    /// Run `f` under the breaker. While open, calls fail fast with
    /// `CircuitOpen` until the open timeout elapses; the next call then runs
    /// as a half-open probe.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, LlmError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= Duration::from_millis(self.config.timeout_ms) {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                } else {
                    return Err(LlmError::CircuitOpen {
                        provider: self.name.clone(),
                    });
                }
            }
        }

        let result = f().await;

        let mut inner = self.inner.lock().unwrap();
        match (&result, inner.state) {
            (Ok(_), CircuitState::Closed) => {
                inner.failure_count = 0;
            }
            (Ok(_), CircuitState::HalfOpen) => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            (Err(_), CircuitState::Closed) => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (Err(_), CircuitState::HalfOpen) => {
                // A single probe failure re-opens the breaker.
                inner.success_count = 0;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            // A concurrent call already moved the state; nothing to record.
            (_, CircuitState::Open) => {}
        }
        result
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Restore closed with zero counters, emitting the transition.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn transition(&self, inner: &mut Inner, new_state: CircuitState) {
        let previous = inner.state;
        inner.state = new_state;

        if new_state == CircuitState::Open {
            warn!(
                breaker = %self.name,
                previous = previous.as_str(),
                failures = inner.failure_count,
                "circuit opened"
            );
        } else {
            info!(
                breaker = %self.name,
                previous = previous.as_str(),
                new = new_state.as_str(),
                "circuit state changed"
            );
        }

        self.events.emit(Event::CircuitStateChanged(CircuitEvent {
            name: self.name.clone(),
            previous_state: previous.as_str().to_string(),
            new_state: new_state.as_str().to_string(),
            failure_count: inner.failure_count,
        }));
    }
}
