//! In-memory request store.
//!
//! Used by tests and by embedders that don't need durability. Supports
//! injected failure so the coordinator's store-failure paths can be
//! exercised deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::store::{RequestStore, StoreError};
use crate::request::{RequestId, SavePageRequest};

#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<BTreeMap<RequestId, SavePageRequest>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with `StoreError::Failure`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::Failure("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn add(&self, request: &SavePageRequest) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.requests.write().unwrap();
        if map.contains_key(&request.id) {
            return Err(StoreError::AlreadyExists(request.id));
        }
        map.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<Option<SavePageRequest>, StoreError> {
        self.check()?;
        Ok(self.requests.read().unwrap().get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<SavePageRequest>, StoreError> {
        self.check()?;
        Ok(self.requests.read().unwrap().values().cloned().collect())
    }

    async fn update(&self, request: &SavePageRequest) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.requests.write().unwrap();
        match map.get_mut(&request.id) {
            Some(slot) => {
                *slot = request.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(request.id)),
        }
    }

    async fn remove(&self, id: RequestId) -> Result<SavePageRequest, StoreError> {
        self.check()?;
        self.requests
            .write()
            .unwrap()
            .remove(&id)
            .ok_or(StoreError::NotFound(id))
    }
}
