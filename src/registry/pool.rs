//! Per-tunnel endpoint pool
//!
//! Holds the live endpoints of one tunnel and hands them out round-robin.
//! The lock guards only the vector and cursor; all socket I/O happens after
//! the lock is dropped, under the endpoint's own exchange lock.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

use super::endpoint::Endpoint;

#[derive(Debug)]
pub struct EndpointPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

#[derive(Debug)]
struct PoolInner {
    endpoints: Vec<Arc<Endpoint>>,
    cursor: usize,
}

impl EndpointPool {
    pub fn new(capacity: usize) -> Self {
        EndpointPool {
            inner: Mutex::new(PoolInner {
                endpoints: Vec::new(),
                cursor: 0,
            }),
            capacity,
        }
    }

    /// Advertised capacity. Enforced at the tunnel listener, not here;
    /// `attach` itself never refuses.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an endpoint. Unconditional.
    pub fn attach(&self, endpoint: Arc<Endpoint>) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.endpoints.iter().all(|e| e.id() != endpoint.id()));
        inner.endpoints.push(endpoint);
        trace!("pool size now {}", inner.endpoints.len());
    }

    /// Round-robin selection. The endpoint stays pooled; callers serialise
    /// their exchange through the endpoint's own lock.
    pub fn next(&self) -> Option<Arc<Endpoint>> {
        let mut inner = self.inner.lock();
        if inner.endpoints.is_empty() {
            return None;
        }
        let idx = inner.cursor % inner.endpoints.len();
        inner.cursor = (idx + 1) % inner.endpoints.len();
        Some(inner.endpoints[idx].clone())
    }

    /// Remove an endpoint by identity without closing it. No-op when the
    /// endpoint is not pooled. Returns the removed handle so the caller can
    /// close it (closing needs the async exchange lock).
    pub fn detach(&self, endpoint_id: u64) -> Option<Arc<Endpoint>> {
        let mut inner = self.inner.lock();
        let idx = inner.endpoints.iter().position(|e| e.id() == endpoint_id)?;
        let removed = inner.endpoints.remove(idx);
        if idx < inner.cursor {
            inner.cursor -= 1;
        }
        if inner.cursor >= inner.endpoints.len() {
            inner.cursor = 0;
        }
        Some(removed)
    }

    /// Detach and close, in one call.
    pub async fn detach_and_close(&self, endpoint_id: u64) {
        if let Some(endpoint) = self.detach(endpoint_id) {
            endpoint.close().await;
        }
    }

    /// Empty the pool, returning every endpoint for the caller to close.
    pub fn drain(&self) -> Vec<Arc<Endpoint>> {
        let mut inner = self.inner.lock();
        inner.cursor = 0;
        std::mem::take(&mut inner.endpoints)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().endpoints.len()
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }
}
