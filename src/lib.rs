//! Rate-limited key-value service and its retrying client.
//!
//! # Architecture Overview
//!
//! ```text
//!   KvClient ──▶ RetryEngine ──▶ Transport ──▶ network
//!      ▲              │  ▲                        │
//!      │      BackoffPolicy  Clock                ▼
//!      │                                   HttpServer (axum)
//!      │                                        │
//!      │                               rate_limit_middleware
//!      │                                  RateLimiter.allow
//!      │                              ┌─────────┴─────────┐
//!      │                           allowed             rejected
//!      │                              │              429 + Retry-After
//!      │                         handlers ──▶ ItemStore    │
//!      └──────────────────── response ◀───────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod storage;

pub use client::KvClient;
pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
