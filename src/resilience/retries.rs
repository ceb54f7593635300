//! Retry engine.
//!
//! Drives one logical operation across physical attempts.
//!
//! # States
//! ```text
//! Idle → Sending ─┬─ 2xx ─────────────────────────────→ Succeeded
//!                 ├─ 429 ──→ Throttled ─┐
//!                 ├─ 5xx/io → Retryable ─┴→ Waiting → Sending (attempt + 1)
//!                 └─ other 4xx ───────────────────────→ TerminalFailure
//!
//! Throttled/Retryable with attempt == max_attempts → TerminalFailure (exhausted)
//! cancellation in Sending/Waiting                  → Cancelled
//! ```
//!
//! # Design Decisions
//! - A server hint on a throttled response is used verbatim as the delay
//! - Attempts are strictly sequential; attempt N+1 never starts before N resolves
//! - Intermediate failures only reach the caller through [`AttemptObserver`]
//! - Whether a resent write is harmless is up to the store (unique keys), not the engine

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::transport::{OperationRequest, Transport, TransportError, TransportResponse};

/// Engine state for a single logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Sending { attempt: u32 },
    Throttled { attempt: u32, hint: Option<Duration> },
    Retryable { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Succeeded,
    TerminalFailure,
    Cancelled,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded | RetryState::TerminalFailure | RetryState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    RetryableFailure,
    TerminalFailure,
}

/// One physical try. Lives only as long as the `execute` call that made it.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: u32,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

/// What a single attempt's result means for the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    Throttled { hint: Option<Duration> },
    Transient,
    Terminal,
}

/// Classify one attempt result.
///
/// Anything below 400 is success. 429 is throttling, 408 and 5xx are
/// transient, remaining 4xx are terminal. No response at all is transient.
pub fn classify(result: &Result<TransportResponse, TransportError>) -> Classification {
    match result {
        Err(_) => Classification::Transient,
        Ok(response) => match response.status {
            s if s < 400 => Classification::Success,
            429 => Classification::Throttled {
                hint: response.retry_after,
            },
            408 => Classification::Transient,
            s if s >= 500 => Classification::Transient,
            _ => Classification::Terminal,
        },
    }
}

/// The most recent retryable failure, reported on exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Throttled,
    Status(u16),
    Transport(TransportError),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Throttled => write!(f, "throttled by server"),
            Failure::Status(status) => write!(f, "server returned {}", status),
            Failure::Transport(e) => write!(f, "{}", e),
        }
    }
}

/// Terminal outcome of a logical operation that did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    /// Client error unrelated to timing; never retried.
    ///
    /// `in_doubt` is set when an earlier attempt failed transiently, so the
    /// server may have applied it without us seeing the response.
    #[error("request rejected with status {status} on attempt {attempts}")]
    Terminal {
        status: u16,
        body: String,
        attempts: u32,
        in_doubt: bool,
    },
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Failure },
    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Successful completion of a logical operation.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub response: TransportResponse,
    pub attempts: u32,
}

/// Observation points emitted while an operation runs.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    StateChanged { from: RetryState, to: RetryState },
    AttemptFinished { attempt: Attempt, status: Option<u16> },
    BackoffScheduled { attempt: u32, delay: Duration, hinted: bool },
}

/// Pass-through hook; observers cannot change the engine's decisions.
pub trait AttemptObserver: Send + Sync {
    fn observe(&self, event: &RetryEvent);
}

/// Default observer: structured logs plus client metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn observe(&self, event: &RetryEvent) {
        match event {
            RetryEvent::StateChanged { from, to } => {
                tracing::trace!(?from, ?to, "Retry state changed");
            }
            RetryEvent::AttemptFinished { attempt, status } => {
                crate::observability::metrics::record_client_attempt(attempt.outcome);
                match attempt.outcome {
                    AttemptOutcome::RetryableFailure => tracing::warn!(
                        attempt = attempt.number,
                        status = ?status,
                        elapsed = ?attempt.started_at.elapsed(),
                        "Attempt failed, eligible for retry"
                    ),
                    _ => tracing::debug!(
                        attempt = attempt.number,
                        status = ?status,
                        outcome = ?attempt.outcome,
                        "Attempt finished"
                    ),
                }
            }
            RetryEvent::BackoffScheduled {
                attempt,
                delay,
                hinted,
            } => {
                crate::observability::metrics::record_client_backoff(*delay);
                tracing::info!(attempt, delay = ?delay, hinted, "Backing off before retry");
            }
        }
    }
}

/// Non-terminal states; the loop below only ever holds one of these.
#[derive(Debug, Clone, Copy)]
enum Live {
    Idle,
    Sending { attempt: u32 },
    Throttled { attempt: u32, hint: Option<Duration> },
    Retryable { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
}

impl From<Live> for RetryState {
    fn from(live: Live) -> Self {
        match live {
            Live::Idle => RetryState::Idle,
            Live::Sending { attempt } => RetryState::Sending { attempt },
            Live::Throttled { attempt, hint } => RetryState::Throttled { attempt, hint },
            Live::Retryable { attempt } => RetryState::Retryable { attempt },
            Live::Waiting { attempt, delay } => RetryState::Waiting { attempt, delay },
        }
    }
}

/// What earlier attempts left behind.
struct History {
    last_failure: Failure,
    in_doubt: bool,
}

enum Step {
    Next(Live),
    Done(Result<Delivered, RetryError>),
}

/// Re-issues an [`OperationRequest`] until it succeeds, fails terminally,
/// runs out of attempts, or is cancelled.
#[derive(Clone)]
pub struct RetryEngine {
    policy: BackoffPolicy,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn AttemptObserver>,
}

impl fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryEngine")
            .field("policy", &self.policy)
            .field("max_attempts", &self.max_attempts)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), 5)
    }
}

impl RetryEngine {
    /// `max_attempts` counts the first try; zero is treated as one.
    pub fn new(policy: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts: max_attempts.max(1),
            clock: Arc::new(SystemClock::new()),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Run `request` through `transport` to a single terminal outcome.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<Delivered, RetryError> {
        let mut state = Live::Idle;
        let mut history = History {
            last_failure: Failure::Throttled,
            in_doubt: false,
        };

        loop {
            let step = match state {
                Live::Idle => Step::Next(Live::Sending { attempt: 1 }),

                Live::Sending { attempt } => {
                    if cancel.is_cancelled() {
                        Step::Done(Err(RetryError::Cancelled {
                            attempts: attempt - 1,
                        }))
                    } else {
                        self.send_once(transport, request, cancel, attempt, &mut history)
                            .await
                    }
                }

                Live::Throttled { attempt, hint } => self.schedule(attempt, hint, &history),
                Live::Retryable { attempt } => self.schedule(attempt, None, &history),

                Live::Waiting { attempt, delay } => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Step::Done(Err(RetryError::Cancelled { attempts: attempt })),
                        _ = self.clock.sleep(delay) => Step::Next(Live::Sending { attempt: attempt + 1 }),
                    }
                }
            };

            match step {
                Step::Next(next) => {
                    self.observe_transition(state, next.into());
                    state = next;
                }
                Step::Done(result) => {
                    let terminal = match &result {
                        Ok(_) => RetryState::Succeeded,
                        Err(RetryError::Cancelled { .. }) => RetryState::Cancelled,
                        Err(_) => RetryState::TerminalFailure,
                    };
                    self.observe_transition(state, terminal);
                    return result;
                }
            }
        }
    }

    async fn send_once(
        &self,
        transport: &dyn Transport,
        request: &OperationRequest,
        cancel: &CancellationToken,
        attempt: u32,
        history: &mut History,
    ) -> Step {
        let mut record = Attempt {
            number: attempt,
            started_at: self.clock.now(),
            outcome: AttemptOutcome::Pending,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Step::Done(Err(RetryError::Cancelled { attempts: attempt }));
            }
            result = transport.send(request) => result,
        };

        let classification = classify(&result);
        record.outcome = match classification {
            Classification::Success => AttemptOutcome::Success,
            Classification::Throttled { .. } | Classification::Transient => {
                AttemptOutcome::RetryableFailure
            }
            Classification::Terminal => AttemptOutcome::TerminalFailure,
        };
        self.observer.observe(&RetryEvent::AttemptFinished {
            attempt: record,
            status: result.as_ref().ok().map(|r| r.status),
        });

        match (classification, result) {
            (Classification::Success, Ok(response)) => Step::Done(Ok(Delivered {
                response,
                attempts: attempt,
            })),
            (Classification::Terminal, Ok(response)) => Step::Done(Err(RetryError::Terminal {
                status: response.status,
                body: response.body,
                attempts: attempt,
                in_doubt: history.in_doubt,
            })),
            (Classification::Throttled { hint }, _) => {
                history.last_failure = Failure::Throttled;
                Step::Next(Live::Throttled { attempt, hint })
            }
            (_, Ok(response)) => {
                history.last_failure = Failure::Status(response.status);
                history.in_doubt = true;
                Step::Next(Live::Retryable { attempt })
            }
            (_, Err(e)) => {
                history.last_failure = Failure::Transport(e);
                history.in_doubt = true;
                Step::Next(Live::Retryable { attempt })
            }
        }
    }

    fn schedule(&self, attempt: u32, hint: Option<Duration>, history: &History) -> Step {
        if attempt >= self.max_attempts {
            return Step::Done(Err(RetryError::Exhausted {
                attempts: attempt,
                last: history.last_failure.clone(),
            }));
        }

        let delay = self.policy.next_delay(attempt, hint);
        self.observer.observe(&RetryEvent::BackoffScheduled {
            attempt,
            delay,
            hinted: hint.is_some(),
        });
        Step::Next(Live::Waiting { attempt, delay })
    }

    fn observe_transition(&self, from: Live, to: RetryState) {
        self.observer.observe(&RetryEvent::StateChanged {
            from: from.into(),
            to,
        });
    }
}
