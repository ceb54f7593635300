//! Router-level tests driven in-process with `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use kv_gateway::config::ServiceConfig;
use kv_gateway::resilience::ManualClock;
use kv_gateway::security::rate_limit::RateLimiter;
use kv_gateway::storage::MemoryStore;
use kv_gateway::HttpServer;

fn app(config: ServiceConfig) -> Router {
    HttpServer::new(config, Arc::new(MemoryStore::new())).router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_create_then_conflict() {
    let app = app(ServiceConfig::default());

    let (status, body) = send(&app, post("/items", json!({"key": "a", "value": "1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"key": "a", "value": "1"}));

    let (status, body) = send(&app, post("/items/", json!({"key": "a", "value": "2"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Key exists");
}

#[tokio::test]
async fn test_missing_items_are_404() {
    let app = app(ServiceConfig::default());

    for method in ["GET", "DELETE"] {
        let (status, body) = send(&app, req(method, "/items/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Key not found");
    }
    let (status, _) = send(&app, req("PUT", "/items/nope?value=x")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete() {
    let app = app(ServiceConfig::default());
    send(&app, post("/items", json!({"key": "a", "value": "1"}))).await;

    let (status, body) = send(&app, req("PUT", "/items/a?value=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], "2");

    let (status, _) = send(&app, req("PUT", "/items/a")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, req("DELETE", "/items/a")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Deleted successfully");

    let (status, _) = send(&app, req("GET", "/items/a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_pagination() {
    let app = app(ServiceConfig::default());
    for i in 0..12 {
        send(&app, post("/items", json!({"key": format!("k{i}"), "value": "v"}))).await;
    }

    let (status, body) = send(&app, req("GET", "/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["page_size"], 10);
    assert_eq!(body["total"], 12);
    assert_eq!(body["items"].as_array().unwrap().len(), 10);

    let (_, body) = send(&app, req("GET", "/items?page=2&page_size=10")).await;
    let keys: Vec<_> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["k10", "k11"]);

    let (_, body) = send(&app, req("GET", "/items?page=9")).await;
    assert_eq!(body["items"], json!([]));
}

#[tokio::test]
async fn test_list_rejects_out_of_range_paging() {
    let app = app(ServiceConfig::default());
    for uri in ["/items?page=0", "/items?page_size=0", "/items?page_size=101"] {
        let (status, _) = send(&app, req("GET", uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_request_id_is_assigned_and_propagated() {
    let app = app(ServiceConfig::default());

    let response = app.clone().oneshot(req("GET", "/health")).await.unwrap();
    assert!(!response.headers()["x-request-id"].is_empty());

    let request = Request::get("/health")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_limiter_window_resets_on_clock() {
    let mut config = ServiceConfig::default();
    config.rate_limit.limit = 2;
    config.rate_limit.window_secs = 10;

    let clock = ManualClock::new();
    let limiter = Arc::new(RateLimiter::with_clock(
        2,
        Duration::from_secs(10),
        Arc::new(clock.clone()),
    ));
    let app = HttpServer::with_limiter(config, Arc::new(MemoryStore::new()), limiter).router();

    assert_eq!(send(&app, req("GET", "/items")).await.0, StatusCode::OK);
    assert_eq!(send(&app, req("GET", "/items")).await.0, StatusCode::OK);

    clock.advance(Duration::from_secs(3));
    let response = app.clone().oneshot(req("GET", "/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "7");
    assert_eq!(response.headers()["retry-after-ms"], "7000");

    clock.advance(Duration::from_secs(7));
    assert_eq!(send(&app, req("GET", "/items")).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let mut config = ServiceConfig::default();
    config.rate_limit.enabled = false;
    config.rate_limit.limit = 1;
    let app = app(config);

    for _ in 0..5 {
        assert_eq!(send(&app, req("GET", "/items")).await.0, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = ServiceConfig::default();
    config.listener.max_body_bytes = 64;
    let app = app(config);

    let big = "x".repeat(1024);
    let (status, _) = send(&app, post("/items", json!({"key": "k", "value": big}))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
