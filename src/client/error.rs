//! Client-facing error taxonomy.

use std::time::Duration;

use crate::resilience::retries::{Failure, RetryError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("key not found")]
    NotFound,

    /// 409 from the store. `in_doubt` means an earlier attempt may have created it.
    #[error("key already exists")]
    AlreadyExists { attempts: u32, in_doubt: bool },

    /// Any other client error; never retried.
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Failure },

    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("operation timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// `detail` field of a JSON error body, or the raw body.
fn detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d.as_str() {
            Some(s) => s.to_string(),
            None => d.to_string(),
        }))
        .unwrap_or_else(|| body.to_string())
}

impl From<RetryError> for ClientError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Terminal { status: 404, .. } => ClientError::NotFound,
            RetryError::Terminal {
                status: 409,
                attempts,
                in_doubt,
                ..
            } => ClientError::AlreadyExists { attempts, in_doubt },
            RetryError::Terminal { status, body, .. } => ClientError::Rejected {
                status,
                detail: detail(&body),
            },
            RetryError::Exhausted { attempts, last } => ClientError::Exhausted { attempts, last },
            RetryError::Cancelled { attempts } => ClientError::Cancelled { attempts },
        }
    }
}
