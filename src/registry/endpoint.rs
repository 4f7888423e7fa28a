//! Tunnel endpoint: one agent-side TCP socket
//!
//! An endpoint starts in framed mode (one HTTP request written by the
//! gateway, one HTTP response written by the agent, repeatable). Its socket
//! and residue buffer live behind an async lock held for the duration of one
//! framed exchange; an upgrade takes the socket out entirely, after which
//! the endpoint is spent.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

use crate::common::net::configure_tcp_stream;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// The socket plus the long-lived read buffer.
///
/// The residue buffer is the single logical reader for the endpoint's life:
/// bytes read past the end of one response stay here for the next one.
pub struct EndpointIo {
    pub stream: TcpStream,
    pub residue: BytesMut,
}

/// One pooled agent connection.
pub struct Endpoint {
    id: u64,
    peer: SocketAddr,
    io: Mutex<Option<EndpointIo>>,
    closed: AtomicBool,
}

impl Endpoint {
    /// Wrap a freshly handshaken socket. `residue` carries any bytes the
    /// handshake reader pulled past the final newline.
    pub fn new(stream: TcpStream, peer: SocketAddr, residue: BytesMut) -> Arc<Self> {
        configure_tcp_stream(&stream);
        Arc::new(Endpoint {
            id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            io: Mutex::new(Some(EndpointIo { stream, residue })),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Acquire the exchange lock. `None` inside means the endpoint was
    /// closed or its socket was taken for an upgrade.
    pub async fn lock(&self) -> MutexGuard<'_, Option<EndpointIo>> {
        self.io.lock().await
    }

    /// Take the socket out for opaque use. The endpoint is spent afterwards.
    pub fn take(&self, guard: &mut MutexGuard<'_, Option<EndpointIo>>) -> Option<EndpointIo> {
        let io = guard.take();
        if io.is_some() {
            self.closed.store(true, Ordering::Relaxed);
        }
        io
    }

    /// Close the socket. Idempotent; waits for an in-flight exchange to end.
    pub async fn close(&self) {
        let mut guard = self.io.lock().await;
        drop(self.take(&mut guard));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
