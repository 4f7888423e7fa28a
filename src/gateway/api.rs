//! JSON surfaces on the public port
//!
//! Status snapshots and tunnel descriptors, plus the seam the admin
//! endpoints delegate through.

use crate::common::http::RequestHead;
use crate::config::GatewayConfig;
use crate::registry::{TunnelRecord, TunnelRegistry};
use async_trait::async_trait;
use serde::Serialize;

/// Process memory snapshot, Go-runtime key names preserved for the clients
/// that already consume this surface.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemStats {
    pub alloc: u64,
    #[serde(rename = "totalAlloc")]
    pub total_alloc: u64,
    pub sys: u64,
    #[serde(rename = "heapAlloc")]
    pub heap_alloc: u64,
}

impl MemStats {
    /// Best-effort sample; resident/virtual sizes from procfs on Linux,
    /// zeros elsewhere. Sampled, never locked.
    pub fn sample() -> Self {
        let (resident, virt) = read_statm().unwrap_or((0, 0));
        MemStats {
            alloc: resident,
            total_alloc: virt,
            sys: virt,
            heap_alloc: resident,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_statm() -> Option<(u64, u64)> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = statm.split_whitespace();
    let size: u64 = fields.next()?.parse().ok()?;
    let resident: u64 = fields.next()?.parse().ok()?;
    Some((resident * PAGE_SIZE, size * PAGE_SIZE))
}

#[cfg(not(target_os = "linux"))]
fn read_statm() -> Option<(u64, u64)> {
    None
}

/// `GET /api/status` body
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub tunnels: usize,
    pub auth_enabled: bool,
    pub tunnel_port: u16,
    pub mem: MemStats,
}

pub fn server_status(registry: &TunnelRegistry, config: &GatewayConfig) -> ServerStatus {
    ServerStatus {
        tunnels: registry.count(),
        auth_enabled: registry.auth().enabled(),
        tunnel_port: config.tunnel_port,
        mem: MemStats::sample(),
    }
}

/// `GET /api/tunnels/{id}/status` body
#[derive(Debug, Serialize)]
pub struct TunnelStatus {
    pub connected_sockets: usize,
    pub created_at: i64,
    pub last_access: i64,
}

pub fn tunnel_status(record: &TunnelRecord) -> TunnelStatus {
    TunnelStatus {
        connected_sockets: record.pool().size(),
        created_at: record.created_unix(),
        last_access: record.last_access_unix(),
    }
}

/// Allocation response body; everything the agent needs to start its
/// supervisor.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct TunnelDescriptor {
    pub id: String,
    pub port: u16,
    pub max_conn_count: usize,
    pub url: String,
    pub auth_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub fn descriptor(record: &TunnelRecord, config: &GatewayConfig) -> TunnelDescriptor {
    TunnelDescriptor {
        id: record.id().to_string(),
        port: config.tunnel_port,
        max_conn_count: record.pool().capacity(),
        url: config.public_url(record.id()),
        auth_required: record.token().is_some(),
        token: record.token().map(|t| t.to_string()),
    }
}

/// Seam for the out-of-scope admin endpoints under `/api/admin/`.
#[async_trait]
pub trait AdminHandler: Send + Sync {
    /// Returns (status, JSON body).
    async fn handle(&self, head: &RequestHead, body: &[u8]) -> (u16, String);
}

/// Default: admin surface not wired up.
pub struct NoAdmin;

#[async_trait]
impl AdminHandler for NoAdmin {
    async fn handle(&self, _head: &RequestHead, _body: &[u8]) -> (u16, String) {
        (
            404,
            serde_json::json!({"message": "admin interface not configured"}).to_string(),
        )
    }
}
