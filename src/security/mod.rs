//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /items request:
//!     → rate_limit.rs (identify client, count against its window)
//!     → allowed: handler runs, limit headers added
//!     → rejected: 429 with Retry-After / retry-after-ms, handler never runs
//! ```
//!
//! # Design Decisions
//! - Admission is checked before any store work
//! - The limiter is an owned component handed to the router, not a global

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, ClientWindow, Decision, RateLimiter};
