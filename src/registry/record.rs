//! Registry-internal tunnel record

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::pool::EndpointPool;

/// One allocated tunnel: identity, timestamps, bound credential, endpoints.
#[derive(Debug)]
pub struct TunnelRecord {
    id: String,
    created_at: DateTime<Utc>,
    created_mono: Instant,
    /// Unix seconds, reported on the status surface
    last_access: AtomicI64,
    /// Seconds since `created_mono`; the janitor's monotonic stamp
    last_touch: AtomicU64,
    /// Bearer token bound at allocation; `None` when auth is disabled
    token: Option<String>,
    pool: Arc<EndpointPool>,
}

impl TunnelRecord {
    pub fn new(id: String, token: Option<String>, max_conns: usize) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(TunnelRecord {
            id,
            created_at: now,
            created_mono: Instant::now(),
            last_access: AtomicI64::new(now.timestamp()),
            last_touch: AtomicU64::new(0),
            token,
            pool: Arc::new(EndpointPool::new(max_conns)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Stamp activity: proxied requests and endpoint attaches both count.
    pub fn touch(&self) {
        self.last_access
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        self.last_touch
            .store(self.created_mono.elapsed().as_secs(), Ordering::Relaxed);
    }

    pub fn created_unix(&self) -> i64 {
        self.created_at.timestamp()
    }

    pub fn last_access_unix(&self) -> i64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Time since the last touch, on the monotonic clock.
    pub fn idle(&self) -> Duration {
        let age = self.created_mono.elapsed().as_secs();
        let touched = self.last_touch.load(Ordering::Relaxed);
        Duration::from_secs(age.saturating_sub(touched))
    }
}
