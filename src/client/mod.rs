//! Client library for the item API.
//!
//! # Data Flow
//! ```text
//! KvClient::create/get/update/delete/list
//!     → RetryEngine (attempt loop, backoff, cancellation)
//!     → ReqwestTransport (one HTTP exchange per attempt)
//!     → ClientError (exactly one terminal outcome per call)
//! ```

pub mod error;
pub mod kv;
pub mod transport;

pub use error::ClientError;
pub use kv::{engine_from_config, ItemPage, KvClient};
pub use transport::ReqwestTransport;
