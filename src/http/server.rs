//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the item and health handlers
//! - Gate item routes behind the per-client rate limiter
//! - Wire up middleware (request ID, tracing, timeout, body limit, metrics)
//! - Serve on a listener until shutdown is signalled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::http::handlers::{self, AppState};
use crate::http::request::{self, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::storage::ItemStore;

/// HTTP front end of the key-value service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a server with a limiter built from `config.rate_limit`.
    pub fn new(config: ServiceConfig, store: Arc<dyn ItemStore>) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        Self::with_limiter(config, store, limiter)
    }

    /// Create a server around an existing limiter (e.g. one on a test clock).
    pub fn with_limiter(
        config: ServiceConfig,
        store: Arc<dyn ItemStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let state = AppState {
            store,
            pagination: config.pagination.clone(),
        };
        let router = Self::build_router(&config, state, limiter.clone());
        Self {
            router,
            config,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(config: &ServiceConfig, state: AppState, limiter: Arc<RateLimiter>) -> Router {
        let mut items = Router::new()
            .route("/items", post(handlers::create_item).get(handlers::list_items))
            .route("/items/", post(handlers::create_item).get(handlers::list_items))
            .route(
                "/items/{key}",
                get(handlers::get_item)
                    .put(handlers::update_item)
                    .delete(handlers::delete_item),
            );

        if config.rate_limit.enabled {
            items = items.route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        Router::new()
            .merge(items)
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(middleware::from_fn(track_metrics))
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request::request_id(req.headers()),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.config.rate_limit.enabled,
            limit = self.limiter.limit(),
            window = ?self.limiter.window(),
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
