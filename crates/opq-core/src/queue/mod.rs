//! Persistent request queue.
//!
//! Wraps a pluggable [`RequestStore`] and owns the lifecycle semantics: the
//! attempt markers are the only writers of the attempt counters, and batch
//! mutations report a per-id status so one missing request never aborts the
//! rest of the batch.

mod memory;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{RequestStore, StoreError};

use std::sync::Arc;

use crate::request::{RequestId, RequestState, SavePageRequest};

/// Per-id outcome of a batch mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemActionStatus {
    Success,
    NotFound,
    StoreError,
}

/// Result of a batch mutation: one status per requested id, plus the bodies
/// that were actually changed (for observer notification).
#[derive(Debug, Default)]
pub struct UpdateResult {
    pub statuses: Vec<(RequestId, ItemActionStatus)>,
    pub updated: Vec<SavePageRequest>,
}

/// The coordinator's view of persisted requests.
#[derive(Clone)]
pub struct RequestQueue {
    store: Arc<dyn RequestStore>,
}

impl RequestQueue {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly created request. Returns the stored body.
    pub async fn add_request(
        &self,
        request: SavePageRequest,
    ) -> Result<SavePageRequest, StoreError> {
        self.store.add(&request).await?;
        Ok(request)
    }

    /// All persisted requests, order unspecified.
    pub async fn get_requests(&self) -> Result<Vec<SavePageRequest>, StoreError> {
        self.store.get_all().await
    }

    /// Remove each id, collecting a per-id status. Removed bodies are
    /// returned so the caller can notify observers.
    pub async fn remove_requests(&self, ids: &[RequestId]) -> UpdateResult {
        let mut result = UpdateResult::default();
        for &id in ids {
            match self.store.remove(id).await {
                Ok(body) => {
                    result.statuses.push((id, ItemActionStatus::Success));
                    result.updated.push(body);
                }
                Err(StoreError::NotFound(_)) => {
                    result.statuses.push((id, ItemActionStatus::NotFound));
                }
                Err(e) => {
                    tracing::warn!("remove request {id} failed: {e}");
                    result.statuses.push((id, ItemActionStatus::StoreError));
                }
            }
        }
        result
    }

    /// Set `new_state` on each id (used by pause/resume). Per-id statuses as
    /// in [`Self::remove_requests`].
    pub async fn change_requests_state(
        &self,
        ids: &[RequestId],
        new_state: RequestState,
    ) -> UpdateResult {
        let mut result = UpdateResult::default();
        for &id in ids {
            let status = match self.store.get(id).await {
                Ok(Some(mut request)) => {
                    request.state = new_state;
                    match self.store.update(&request).await {
                        Ok(()) => {
                            result.updated.push(request);
                            ItemActionStatus::Success
                        }
                        Err(StoreError::NotFound(_)) => ItemActionStatus::NotFound,
                        Err(e) => {
                            tracing::warn!("change state of request {id} failed: {e}");
                            ItemActionStatus::StoreError
                        }
                    }
                }
                Ok(None) => ItemActionStatus::NotFound,
                Err(e) => {
                    tracing::warn!("load request {id} failed: {e}");
                    ItemActionStatus::StoreError
                }
            };
            result.statuses.push((id, status));
        }
        result
    }

    /// The request is being dispatched: bump the started counter and mark it
    /// `Offlining`.
    pub async fn mark_attempt_started(
        &self,
        id: RequestId,
    ) -> Result<SavePageRequest, StoreError> {
        self.mutate(id, |request| {
            request.started_attempt_count += 1;
            request.state = RequestState::Offlining;
        })
        .await
    }

    /// The attempt ran and failed retryably: bump the completed counter and
    /// return the request to `Available`. A request paused while its attempt
    /// was being canceled stays paused.
    pub async fn mark_attempt_completed(
        &self,
        id: RequestId,
    ) -> Result<SavePageRequest, StoreError> {
        self.mutate(id, |request| {
            request.completed_attempt_count += 1;
            if request.state == RequestState::Offlining {
                request.state = RequestState::Available;
            }
        })
        .await
    }

    /// The attempt never truly ran (canceled before the offliner did work):
    /// return to `Available` without consuming retry budget. Paused requests
    /// stay paused.
    pub async fn mark_attempt_aborted(
        &self,
        id: RequestId,
    ) -> Result<SavePageRequest, StoreError> {
        self.mutate(id, |request| {
            if request.state == RequestState::Offlining {
                request.state = RequestState::Available;
            }
        })
        .await
    }

    /// Revert any request stranded in `Offlining` (crash, external
    /// collaborator that never reported back) to `Available`. Counters are
    /// untouched. Returns how many rows were reset.
    pub async fn reconcile(&self) -> Result<u32, StoreError> {
        let mut reset = 0;
        for request in self.store.get_all().await? {
            if request.state == RequestState::Offlining {
                let mut request = request;
                request.state = RequestState::Available;
                self.store.update(&request).await?;
                reset += 1;
            }
        }
        if reset > 0 {
            tracing::info!("reconciled {reset} stranded offlining request(s)");
        }
        Ok(reset)
    }

    async fn mutate(
        &self,
        id: RequestId,
        apply: impl FnOnce(&mut SavePageRequest),
    ) -> Result<SavePageRequest, StoreError> {
        let mut request = self
            .store
            .get(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        apply(&mut request);
        self.store.update(&request).await?;
        Ok(request)
    }
}
