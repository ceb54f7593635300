//! Failure injection tests for the retrying client.
//!
//! Each test points a real `KvClient` at a raw TCP backend that misbehaves on
//! cue and checks how many attempts were made and what the caller saw.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use common::{dead_address, fast_client_config, start_programmable_backend, Reply};
use kv_gateway::client::ClientError;
use kv_gateway::resilience::{Failure, TransportError};
use kv_gateway::KvClient;

const ITEM: &str = r#"{"key":"a","value":"1"}"#;

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

#[tokio::test]
async fn test_transient_errors_then_success() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Reply::new(503, r#"{"detail":"unavailable"}"#)
            } else {
                Reply::new(200, ITEM)
            }
        }
    })
    .await;

    let client = KvClient::new(&fast_client_config(&format!("http://{}", addr))).unwrap();
    let item = client.get("a").await.unwrap();

    assert_eq!(item.value, "1");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_bad_request_never_retried() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Reply::new(400, r#"{"detail":"bad input"}"#) }
    })
    .await;

    let client = KvClient::new(&fast_client_config(&format!("http://{}", addr))).unwrap();

    match client.update("a", "1").await {
        Err(ClientError::Rejected { status, detail }) => {
            assert_eq!(status, 400);
            assert_eq!(detail, "bad input");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_throttle_hint_is_honored() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Reply::new(429, r#"{"detail":"Rate limit exceeded. Try again later."}"#)
                    .header("Retry-After", "1")
                    .header("retry-after-ms", "300")
            } else {
                Reply::new(200, ITEM)
            }
        }
    })
    .await;

    // Backoff alone would wait at most 50ms.
    let client = KvClient::new(&fast_client_config(&format!("http://{}", addr))).unwrap();
    let start = Instant::now();
    client.get("a").await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_persistent_throttling_exhausts_budget() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Reply::new(429, "{}").header("retry-after-ms", "5") }
    })
    .await;

    let mut config = fast_client_config(&format!("http://{}", addr));
    config.max_attempts = 3;
    let client = KvClient::new(&config).unwrap();

    match client.get("a").await {
        Err(ClientError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, Failure::Throttled);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unreachable_backend_exhausts_with_connect_error() {
    let addr = dead_address().await;
    let mut config = fast_client_config(&format!("http://{}", addr));
    config.max_attempts = 2;
    let client = KvClient::new(&config).unwrap();

    match client.list(1, 10).await {
        Err(ClientError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(last, Failure::Transport(TransportError::Connect(_))));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_attempt_times_out_and_is_retried() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Reply::new(200, ITEM)
        }
    })
    .await;

    let mut config = fast_client_config(&format!("http://{}", addr));
    config.request_timeout_ms = 100;
    let client = KvClient::new(&config).unwrap();

    client.get("a").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_during_backoff_wait() {
    let calls = counter();
    let seen = calls.clone();
    let addr = start_programmable_backend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Reply::new(429, "{}").header("retry-after-ms", "10000") }
    })
    .await;

    let client = KvClient::new(&fast_client_config(&format!("http://{}", addr))).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = client.get_with_cancel("a", &cancel).await;

    assert!(matches!(result, Err(ClientError::Cancelled { attempts: 1 })));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_operation_timeout_bounds_whole_call() {
    let addr = start_programmable_backend(|| async { Reply::new(503, "{}") }).await;

    let mut config = fast_client_config(&format!("http://{}", addr));
    config.max_attempts = 1_000;
    config.operation_timeout_ms = Some(300);
    let client = KvClient::new(&config).unwrap();

    assert!(matches!(
        client.get("a").await,
        Err(ClientError::TimedOut { after }) if after == Duration::from_millis(300)
    ));
}
