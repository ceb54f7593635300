//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID assigned/propagated)
//!     → security::rate_limit (per-client admission for /items)
//!     → handlers.rs (item CRUD, store work on the blocking pool)
//!     → response.rs (errors rendered as {"detail": ...})
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::HttpServer;
