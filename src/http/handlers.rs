//! Item endpoints.
//!
//! Store calls go through [`run_store`], which moves them onto tokio's
//! blocking pool so a slow store never stalls the async workers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::http::response::ApiError;
use crate::storage::{Item, ItemStore, StoreError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListResponse {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub items: Vec<Item>,
}

async fn run_store<T, F>(store: Arc<dyn ItemStore>, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ItemStore) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Store task failed");
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(data): Json<ItemCreate>,
) -> Result<Json<Item>, ApiError> {
    let item = run_store(state.store, move |store| store.create(&data.key, &data.value)).await?;
    tracing::debug!(key = %item.key, "Item created");
    Ok(Json(item))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Item>, ApiError> {
    run_store(state.store, move |store| store.get(&key))
        .await
        .map(Json)
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<UpdateParams>,
) -> Result<Json<Item>, ApiError> {
    let item = run_store(state.store, move |store| store.update(&key, &params.value)).await?;
    tracing::debug!(key = %item.key, "Item updated");
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = key.clone();
    run_store(state.store, move |store| store.delete(&key)).await?;
    tracing::debug!(key = %deleted, "Item deleted");
    Ok(Json(json!({ "message": "Deleted successfully" })))
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(state.pagination.default_page_size);

    if page < 1 {
        return Err(ApiError::BadRequest("page must be >= 1".into()));
    }
    if page_size < 1 || page_size > state.pagination.max_page_size {
        return Err(ApiError::BadRequest(format!(
            "page_size must be within 1..={}",
            state.pagination.max_page_size
        )));
    }

    let offset = (page - 1).saturating_mul(page_size);
    let slice = run_store(state.store, move |store| store.list(offset, page_size)).await?;

    Ok(Json(ListResponse {
        page,
        page_size,
        total: slice.total,
        items: slice.items,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
