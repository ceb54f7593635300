//! Per-client fixed-window rate limiting.
//!
//! Windows live in a sharded `DashMap`; the read-check-increment for one
//! client runs under that entry's shard lock, so clients on different shards
//! never contend. A burst straddling a window boundary can see up to
//! `2 * limit` requests; that is the accepted cost of fixed windows.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::transport::RETRY_AFTER_MS;

/// Counter state for one client identity.
#[derive(Debug, Clone)]
pub struct ClientWindow {
    pub client_id: String,
    pub window_start: Instant,
    pub count: u32,
}

/// Admission verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub retry_after: Option<Duration>,
    /// Requests left in the current window after this one.
    pub remaining: u32,
}

/// Fixed-window limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, ClientWindow>,
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
            clock,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `client_id` against its window.
    pub fn allow(&self, client_id: &str) -> Decision {
        let now = self.clock.now();
        let mut entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert_with(|| ClientWindow {
                client_id: client_id.to_string(),
                window_start: now,
                count: 0,
            });
        let window = entry.value_mut();

        let elapsed = now.saturating_duration_since(window.window_start);
        if elapsed >= self.window {
            window.window_start = now;
            window.count = 0;
        }

        if window.count < self.limit {
            window.count += 1;
            Decision {
                allowed: true,
                retry_after: None,
                remaining: self.limit - window.count,
            }
        } else {
            let elapsed = now.saturating_duration_since(window.window_start);
            Decision {
                allowed: false,
                retry_after: Some(self.window.saturating_sub(elapsed)),
                remaining: 0,
            }
        }
    }

    /// Number of distinct clients seen so far.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Identity used for limiting: the peer IP, else `"unknown"`.
///
/// Request headers are caller-chosen and never feed the identity.
pub fn client_identity(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
}

/// Rejection sent when a client is over its window.
pub fn throttled_response(limit: u32, retry_after: Duration) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "detail": "Rate limit exceeded. Try again later." })),
    )
        .into_response();

    let millis = retry_after.as_millis().min(u64::MAX as u128) as u64;
    let secs = millis.div_ceil(1000).max(1);
    let headers = response.headers_mut();
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
    headers.insert(RETRY_AFTER_MS, HeaderValue::from(millis));
    set_limit_headers(headers, limit, 0);
    response
}

/// Middleware gating every request behind [`RateLimiter::allow`].
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_identity(&request);
    let decision = limiter.allow(&client);

    if decision.allowed {
        let mut response = next.run(request).await;
        set_limit_headers(response.headers_mut(), limiter.limit(), decision.remaining);
        response
    } else {
        let retry_after = decision.retry_after.unwrap_or(limiter.window());
        tracing::warn!(client = %client, retry_after = ?retry_after, "Rate limit exceeded");
        metrics::record_rate_limited();
        throttled_response(limiter.limit(), retry_after)
    }
}
