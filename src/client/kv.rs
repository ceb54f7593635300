//! Key-value client.
//!
//! Every call is one logical operation handed to the [`RetryEngine`]. A create
//! that comes back 409 after an attempt with an unknown fate (timeout, 5xx) may
//! be our own earlier write landing. The stored row is read back and accepted
//! only when it holds the value we sent.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::client::error::ClientError;
use crate::client::transport::ReqwestTransport;
use crate::config::ClientConfig;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::retries::{Delivered, RetryEngine};
use crate::resilience::transport::{Method, OperationKind, OperationRequest, Transport};
use crate::storage::Item;

/// One page of the item listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub items: Vec<Item>,
}

/// Retrying client for the item API.
#[derive(Clone)]
pub struct KvClient {
    transport: Arc<dyn Transport>,
    engine: RetryEngine,
    operation_timeout: Option<Duration>,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("engine", &self.engine)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

/// Retry engine configured from the client section.
pub fn engine_from_config(config: &ClientConfig) -> RetryEngine {
    let policy = BackoffPolicy::new(
        Duration::from_millis(config.base_delay_ms),
        Duration::from_millis(config.max_delay_ms),
    )
    .with_jitter(config.jitter);
    RetryEngine::new(policy, config.max_attempts)
}

impl KvClient {
    /// HTTP client with the system clock and tracing observer.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(
            &config.base_url,
            Duration::from_millis(config.request_timeout_ms),
        )?;
        Ok(Self::with_transport(Arc::new(transport), engine_from_config(config))
            .with_operation_timeout(config.operation_timeout_ms.map(Duration::from_millis)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, engine: RetryEngine) -> Self {
        Self {
            transport,
            engine,
            operation_timeout: None,
        }
    }

    /// Bound each logical operation, retries and waits included.
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub async fn create(&self, key: &str, value: &str) -> Result<Item, ClientError> {
        self.create_with_cancel(key, value, &CancellationToken::new())
            .await
    }

    pub async fn create_with_cancel(
        &self,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<Item, ClientError> {
        let request = OperationRequest::new(OperationKind::Create, Method::Post, ["items"])
            .json(json!({ "key": key, "value": value }));

        match self.call(&request, cancel).await {
            Ok(delivered) => decode(&delivered),
            Err(ClientError::AlreadyExists {
                attempts,
                in_doubt: true,
            }) => self.reconcile_create(key, value, attempts, cancel).await,
            Err(e) => Err(e),
        }
    }

    /// Decide whether an in-doubt 409 is our own earlier create.
    async fn reconcile_create(
        &self,
        key: &str,
        value: &str,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<Item, ClientError> {
        let conflict = ClientError::AlreadyExists {
            attempts,
            in_doubt: true,
        };
        match self.get_with_cancel(key, cancel).await {
            Ok(stored) if stored.value == value => {
                tracing::info!(key, attempts, "Create already applied by an earlier attempt");
                Ok(stored)
            }
            Ok(_) => {
                tracing::warn!(key, attempts, "Key held with a different value");
                Err(conflict)
            }
            Err(ClientError::NotFound) => Err(conflict),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Item, ClientError> {
        self.get_with_cancel(key, &CancellationToken::new()).await
    }

    pub async fn get_with_cancel(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Item, ClientError> {
        let request = OperationRequest::new(OperationKind::Read, Method::Get, ["items", key]);
        decode(&self.call(&request, cancel).await?)
    }

    pub async fn update(&self, key: &str, value: &str) -> Result<Item, ClientError> {
        self.update_with_cancel(key, value, &CancellationToken::new())
            .await
    }

    pub async fn update_with_cancel(
        &self,
        key: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<Item, ClientError> {
        let request = OperationRequest::new(OperationKind::Update, Method::Put, ["items", key])
            .query("value", value);
        decode(&self.call(&request, cancel).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.delete_with_cancel(key, &CancellationToken::new())
            .await
    }

    pub async fn delete_with_cancel(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let request = OperationRequest::new(OperationKind::Delete, Method::Delete, ["items", key]);
        self.call(&request, cancel).await.map(|_| ())
    }

    pub async fn list(&self, page: usize, page_size: usize) -> Result<ItemPage, ClientError> {
        self.list_with_cancel(page, page_size, &CancellationToken::new())
            .await
    }

    pub async fn list_with_cancel(
        &self,
        page: usize,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> Result<ItemPage, ClientError> {
        let request = OperationRequest::new(OperationKind::List, Method::Get, ["items"])
            .query("page", page.to_string())
            .query("page_size", page_size.to_string());
        decode(&self.call(&request, cancel).await?)
    }

    async fn call(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<Delivered, ClientError> {
        tracing::debug!(
            method = request.method.as_str(),
            path = %request.path(),
            kind = ?request.kind,
            "Starting operation"
        );

        let run = self.engine.execute(self.transport.as_ref(), request, cancel);
        let result = match self.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(path = %request.path(), timeout = ?limit, "Operation timed out");
                    return Err(ClientError::TimedOut { after: limit });
                }
            },
            None => run.await,
        };

        result.map_err(ClientError::from)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(delivered: &Delivered) -> Result<T, ClientError> {
    Ok(serde_json::from_str(&delivered.response.body)?)
}
