//! Storage port backing the request queue.
//!
//! The queue owns the lifecycle semantics (attempt markers, state changes);
//! the store only persists records. Any durable keyed store works as long as
//! each operation is applied before its future resolves. Two implementations
//! ship with the crate: [`super::SqliteStore`] and [`super::MemoryStore`].

use async_trait::async_trait;
use thiserror::Error;

use crate::request::{RequestId, SavePageRequest};

/// Error surface of a store. The coordinator treats `Failure` as transient:
/// the persisted state is assumed unchanged and the operation is retried on a
/// later pass.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request {0} already exists")]
    AlreadyExists(RequestId),
    #[error("store failure: {0}")]
    Failure(String),
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new request. `AlreadyExists` if the id is taken.
    async fn add(&self, request: &SavePageRequest) -> Result<(), StoreError>;

    /// Fetch one request by id.
    async fn get(&self, id: RequestId) -> Result<Option<SavePageRequest>, StoreError>;

    /// Fetch every persisted request. Order is unspecified.
    async fn get_all(&self) -> Result<Vec<SavePageRequest>, StoreError>;

    /// Overwrite an existing request. `NotFound` if the id is unknown.
    async fn update(&self, request: &SavePageRequest) -> Result<(), StoreError>;

    /// Delete a request, returning the removed body. `NotFound` if absent.
    async fn remove(&self, id: RequestId) -> Result<SavePageRequest, StoreError>;
}
