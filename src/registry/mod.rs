//! Tunnel registry: id -> record map, allocation, retirement, janitor
//!
//! The map is a concurrent map with per-bucket locking; lookups on unrelated
//! ids never contend, and the janitor sweeps without a global lock.

pub mod endpoint;
mod pool;
mod record;

pub use endpoint::{Endpoint, EndpointIo};
pub use pool::EndpointPool;
pub use record::TunnelRecord;

use crate::auth::AuthProvider;
use crate::common::names;
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Caller identity for an allocation request.
pub struct AllocationContext {
    pub api_key: Option<String>,
    pub client_ip: String,
}

pub struct TunnelRegistry {
    tunnels: DashMap<String, Arc<TunnelRecord>>,
    auth: Arc<dyn AuthProvider>,
    max_conns: usize,
    inactive_after: Duration,
}

impl TunnelRegistry {
    pub fn new(auth: Arc<dyn AuthProvider>, max_conns: usize, inactive_after: Duration) -> Self {
        TunnelRegistry {
            tunnels: DashMap::new(),
            auth,
            max_conns,
            inactive_after,
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Allocate a tunnel id.
    ///
    /// Credentials are validated and the tunnel token minted before the map
    /// entry is claimed; the entry claim is the atomic conflict gate, so of
    /// two concurrent allocations exactly one wins.
    pub async fn allocate(
        &self,
        id: &str,
        ctx: &AllocationContext,
    ) -> Result<Arc<TunnelRecord>> {
        if !names::is_valid_id(id) {
            return Err(Error::invalid_id(format!("invalid tunnel id: {}", id)));
        }
        if self.tunnels.contains_key(id) {
            return Err(Error::conflict(format!("tunnel id {} is taken", id)));
        }

        let token = if self.auth.enabled() {
            let api_key = ctx
                .api_key
                .as_deref()
                .ok_or_else(|| Error::auth("missing API key"))?;
            self.auth.validate_caller(api_key, &ctx.client_ip).await?;
            Some(
                self.auth
                    .mint_tunnel_token(id, &ctx.client_ip, id, api_key)
                    .await?,
            )
        } else {
            None
        };

        match self.tunnels.entry(id.to_string()) {
            Entry::Occupied(_) => Err(Error::conflict(format!("tunnel id {} is taken", id))),
            Entry::Vacant(entry) => {
                let record = TunnelRecord::new(id.to_string(), token, self.max_conns);
                entry.insert(record.clone());
                info!("tunnel {} allocated", id);
                Ok(record)
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<TunnelRecord>> {
        self.tunnels.get(id).map(|r| r.value().clone())
    }

    /// Remove a record and close every endpoint it still holds.
    /// No-op for absent ids.
    pub async fn retire(&self, id: &str) {
        if let Some((_, record)) = self.tunnels.remove(id) {
            let endpoints = record.pool().drain();
            let count = endpoints.len();
            for endpoint in endpoints {
                endpoint.close().await;
            }
            info!("tunnel {} retired ({} endpoints closed)", id, count);
        }
    }

    /// Retire every record whose last access is older than the inactivity
    /// threshold. Called by the janitor; takes no global lock.
    pub async fn retire_stale(&self) {
        let stale: Vec<String> = self
            .tunnels
            .iter()
            .filter(|entry| entry.value().idle() >= self.inactive_after)
            .map(|entry| entry.key().clone())
            .collect();
        for id in stale {
            debug!("retiring stale tunnel {}", id);
            self.retire(&id).await;
        }
    }

    /// Retire everything; used on shutdown.
    pub async fn retire_all(&self) {
        let ids: Vec<String> = self.tunnels.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.retire(&id).await;
        }
    }

    /// Spawn the periodic sweep task.
    pub fn start_janitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.retire_stale().await;
            }
        })
    }

    pub fn count(&self) -> usize {
        self.tunnels.len()
    }

    pub fn max_conns(&self) -> usize {
        self.max_conns
    }
}
