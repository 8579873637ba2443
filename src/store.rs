//! Signature request storage
//!
//! Requests live in a concurrent map keyed by id. Each stored request also
//! gets an async mutex; sign actions take it after their upload, to re-check
//! and save, so two signatures on the same request can never interleave
//! while different requests proceed in parallel.
//!
//! Map guards are only held for the duration of a clone or an insert, never
//! across an `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{RequestId, SignatureRequest, StatusCounts, UserId};

#[derive(Default)]
pub struct RequestStore {
    requests: DashMap<RequestId, SignatureRequest>,
    locks: DashMap<RequestId, Arc<Mutex<()>>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a request
    pub fn save(&self, request: SignatureRequest) {
        self.locks.entry(request.id).or_default();
        self.requests.insert(request.id, request);
    }

    pub fn get(&self, id: &RequestId) -> Option<SignatureRequest> {
        self.requests.get(id).map(|r| r.value().clone())
    }

    /// Acquire the mutation lock of a stored request.
    ///
    /// Returns `None` for unknown ids, so lookups of random ids never
    /// allocate a lock.
    pub async fn lock(&self, id: &RequestId) -> Option<OwnedMutexGuard<()>> {
        let lock = self.locks.get(id).map(|r| Arc::clone(r.value()))?;
        Some(lock.lock_owned().await)
    }

    /// Requests sent by `sender_id`, newest first
    pub fn list_by_sender(&self, sender_id: &UserId) -> Vec<SignatureRequest> {
        self.collect(|r| r.sender_id == *sender_id)
    }

    /// Requests naming `user_id` among their recipients, newest first
    pub fn list_by_recipient(&self, user_id: &UserId) -> Vec<SignatureRequest> {
        self.collect(|r| r.is_recipient(user_id))
    }

    fn collect(&self, filter: impl Fn(&SignatureRequest) -> bool) -> Vec<SignatureRequest> {
        let mut found: Vec<SignatureRequest> = self
            .requests
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        found
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for r in self.requests.iter() {
            counts.add(r.value().status);
        }
        counts
    }

    pub fn total_versions(&self) -> usize {
        self.requests
            .iter()
            .map(|r| r.value().pdf_versions.len())
            .sum()
    }

    /// Copy of every stored request, for persistence
    pub fn snapshot(&self) -> Vec<SignatureRequest> {
        self.requests.iter().map(|r| r.value().clone()).collect()
    }

    /// Load requests from a snapshot, replacing entries with the same id
    pub fn restore(&self, requests: Vec<SignatureRequest>) {
        for request in requests {
            self.save(request);
        }
    }
}
