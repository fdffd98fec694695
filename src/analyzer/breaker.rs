//! Circuit breaker around the outbound AI provider.
//!
//! Closed → Open after `failure_threshold` consecutive failures.
//! Open → HalfOpen once `open_timeout` has elapsed; exactly one probe
//! call is admitted. The probe's success closes the circuit, its failure
//! re-opens it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::SharedClock;

/// Wait hint returned while a half-open probe is outstanding.
const PROBE_BUSY_RETRY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: DateTime<Utc> },
    HalfOpen { probe_in_flight: bool },
}

impl BreakerState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen { .. } => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

/// The circuit refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit open, retry after {}s", retry_after.as_secs())]
pub struct CircuitOpen {
    pub retry_after: Duration,
}

/// Serializable view for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: SharedClock) -> Self {
        let name = name.into();
        tracing::info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            open_timeout_secs = config.open_timeout.as_secs(),
            "Circuit breaker initialized"
        );
        Self {
            name,
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed {
                    consecutive_failures: 0,
                },
                last_failure_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before an open circuit may be probed.
    fn remaining_open(&self, opened_at: DateTime<Utc>) -> Option<Duration> {
        let elapsed = (self.clock.now() - opened_at).to_std().unwrap_or(Duration::ZERO);
        self.config.open_timeout.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Would a call be admitted right now? Does not change state.
    pub fn check(&self) -> Result<(), CircuitOpen> {
        match self.lock().state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { opened_at } => match self.remaining_open(opened_at) {
                Some(retry_after) => Err(CircuitOpen { retry_after }),
                None => Ok(()),
            },
            BreakerState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    Err(CircuitOpen {
                        retry_after: PROBE_BUSY_RETRY,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Admit a call, moving Open → HalfOpen when the timeout has passed.
    /// The returned guard must be settled with `success` or `failure`.
    pub fn try_acquire(&self) -> Result<Admission<'_>, CircuitOpen> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed { .. } => Ok(Admission::new(self, false)),
            BreakerState::Open { opened_at } => {
                if let Some(retry_after) = self.remaining_open(opened_at) {
                    return Err(CircuitOpen { retry_after });
                }
                tracing::info!(component = %self.name, "Circuit half-open, admitting probe call");
                inner.state = BreakerState::HalfOpen {
                    probe_in_flight: true,
                };
                Ok(Admission::new(self, true))
            }
            BreakerState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    return Err(CircuitOpen {
                        retry_after: PROBE_BUSY_RETRY,
                    });
                }
                inner.state = BreakerState::HalfOpen {
                    probe_in_flight: true,
                };
                Ok(Admission::new(self, true))
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if !matches!(inner.state, BreakerState::Closed { .. }) {
            tracing::info!(component = %self.name, "Circuit closed, provider recovered");
        }
        inner.state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.last_failure_at = Some(now);
        match inner.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::error!(
                        component = %self.name,
                        failures,
                        "Circuit opened after consecutive failures"
                    );
                    inner.state = BreakerState::Open { opened_at: now };
                } else {
                    inner.state = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(component = %self.name, "Probe call failed, circuit re-opened");
                inner.state = BreakerState::Open { opened_at: now };
            }
            // Late failure from a call admitted before the circuit opened.
            BreakerState::Open { .. } => {}
        }
    }

    /// A probe ended without an outcome (cancelled).
    fn release_probe(&self) {
        let mut inner = self.lock();
        if let BreakerState::HalfOpen { .. } = inner.state {
            inner.state = BreakerState::HalfOpen {
                probe_in_flight: false,
            };
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let (consecutive_failures, retry_after_secs) = match inner.state {
            BreakerState::Closed {
                consecutive_failures,
            } => (consecutive_failures, None),
            BreakerState::Open { opened_at } => (
                self.config.failure_threshold,
                Some(self.remaining_open(opened_at).map_or(0, |d| d.as_secs().max(1))),
            ),
            BreakerState::HalfOpen { .. } => (self.config.failure_threshold, None),
        };
        BreakerSnapshot {
            state: inner.state.label(),
            consecutive_failures,
            last_failure_at: inner.last_failure_at,
            retry_after_secs,
        }
    }
}

/// Permission to make one provider call.
///
/// Dropping an unsettled probe admission frees the half-open slot so the
/// next caller can probe.
#[must_use]
pub struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe();
        }
    }
}
