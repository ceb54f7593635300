//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical operation (client):
//!     → retries.rs (state machine, one attempt at a time)
//!     → transport.rs (one network exchange, classified by status)
//!     → On throttle/transient: backoff.rs (server hint, else full jitter)
//!     → clock.rs (suspend for the chosen delay)
//! ```
//!
//! # Design Decisions
//! - Time is injected through `Clock`; tests never wait on real timers
//! - Throttling is an expected outcome, not an error path
//! - Cancellation is checked while sending and while waiting

pub mod backoff;
pub mod clock;
pub mod retries;
pub mod transport;

pub use backoff::{BackoffPolicy, Jitter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use retries::{
    classify, Attempt, AttemptObserver, AttemptOutcome, Classification, Delivered, Failure,
    RetryEngine, RetryError, RetryEvent, RetryState, TracingObserver,
};
pub use transport::{
    Method, OperationKind, OperationRequest, Transport, TransportError, TransportResponse,
};
