//! Transport seam between the retry engine and the network.
//!
//! The engine only needs one terminal outcome per attempt: a status code with
//! an optional retry hint and a body, or a [`TransportError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;

/// Millisecond-precision retry hint emitted by the server alongside `Retry-After`.
pub const RETRY_AFTER_MS: &str = "retry-after-ms";

/// HTTP verb of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Idempotency classification of a logical operation.
///
/// Reads, updates and deletes are naturally idempotent. A create is only safe
/// to resend because the store rejects a second insert of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
}

/// The logical unit the engine re-issues across attempts.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub method: Method,
    /// Unencoded path segments below the base URL, e.g. `["items", key]`.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub kind: OperationKind,
}

impl OperationRequest {
    pub fn new<I, S>(kind: OperationKind, method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
            kind,
        }
    }

    /// Display form of the path, for logs.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A completed exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, hint: Duration) -> Self {
        self.retry_after = Some(hint);
        self
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Performs exactly one network exchange per call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OperationRequest) -> Result<TransportResponse, TransportError>;
}

/// Read the server's wait hint. `retry-after-ms` wins over `Retry-After`.
///
/// Only the delta-seconds form of `Retry-After` is understood; fractional
/// seconds are accepted.
pub fn parse_retry_hint(headers: &HeaderMap) -> Option<Duration> {
    let millis = headers
        .get(RETRY_AFTER_MS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis);
    if millis.is_some() {
        return millis;
    }

    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
