//! Tunnel-port listener
//!
//! Accepts agent dial-ins on the tunnel port, reads the line-framed
//! handshake (tunnel id, then a bearer token when auth is enabled), and
//! attaches the socket to the matching pool. Nothing is written back on
//! success; every failure is logged and the socket silently dropped.

use crate::auth::tokens_match;
use crate::common::http::read_line;
use crate::registry::{Endpoint, TunnelRegistry};
use crate::{Error, Result};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct TunnelListener {
    registry: Arc<TunnelRegistry>,
    handshake_timeout: Duration,
}

impl TunnelListener {
    pub fn new(registry: Arc<TunnelRegistry>, handshake_timeout: Duration) -> Self {
        TunnelListener {
            registry,
            handshake_timeout,
        }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("tunnel listener on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handshake(stream, peer).await {
                            debug!("tunnel handshake from {} rejected: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("tunnel accept error: {}", e);
                }
            }
        }
    }

    async fn handshake(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let auth_enabled = self.registry.auth().enabled();
        let mut buf = BytesMut::with_capacity(256);

        let (id, token) = tokio::time::timeout(self.handshake_timeout, async {
            let id = trim_line(&read_line(&mut stream, &mut buf).await?);
            let token = if auth_enabled {
                Some(trim_line(&read_line(&mut stream, &mut buf).await?))
            } else {
                None
            };
            Ok::<_, Error>((id, token))
        })
        .await??;

        if id.is_empty() {
            return Err(Error::protocol("empty tunnel id in handshake"));
        }

        if auth_enabled {
            let token = token.as_deref().unwrap_or_default();
            let claims = self.registry.auth().validate_tunnel_token(token).await?;
            if claims.tunnel_id != id {
                return Err(Error::auth("token bound to a different tunnel"));
            }
        }

        let record = self
            .registry
            .lookup(&id)
            .ok_or_else(|| Error::route(format!("no tunnel {}", id)))?;

        if auth_enabled {
            let token = token.as_deref().unwrap_or_default();
            if !tokens_match(record.token().unwrap_or(""), token) {
                return Err(Error::auth("token does not match tunnel record"));
            }
        }

        if record.pool().is_full() {
            return Err(Error::capacity(format!(
                "tunnel {} already has {} endpoints",
                id,
                record.pool().size()
            )));
        }

        // bytes read past the handshake newline become the endpoint residue
        record.pool().attach(Endpoint::new(stream, peer, buf));
        record.touch();
        debug!(
            "tunnel {} attached endpoint from {} (pool size {})",
            id,
            peer,
            record.pool().size()
        );
        Ok(())
    }
}

fn trim_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_util::StaticAuth;
    use crate::auth::NoAuth;
    use crate::registry::AllocationContext;
    use tokio::io::AsyncWriteExt;

    async fn start(
        registry: Arc<TunnelRegistry>,
        timeout: Duration,
    ) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tunnel_listener = Arc::new(TunnelListener::new(registry, timeout));
        let handle = tokio::spawn(async move {
            let _ = tunnel_listener.serve(listener).await;
        });
        (addr, handle)
    }

    fn ctx() -> AllocationContext {
        AllocationContext {
            api_key: None,
            client_ip: "127.0.0.1".to_string(),
        }
    }

    async fn wait_for_pool(record: &crate::registry::TunnelRecord, size: usize) -> bool {
        for _ in 0..50 {
            if record.pool().size() == size {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_dial_in_attaches_to_pool() {
        let registry = Arc::new(TunnelRegistry::new(
            Arc::new(NoAuth),
            10,
            Duration::from_secs(3600),
        ));
        let record = registry.allocate("alpha", &ctx()).await.unwrap();
        let (addr, _handle) = start(registry.clone(), Duration::from_secs(5)).await;

        let mut agent = TcpStream::connect(addr).await.unwrap();
        agent.write_all(b"alpha\n").await.unwrap();
        assert!(wait_for_pool(&record, 1).await);
    }

    #[tokio::test]
    async fn test_unknown_id_is_rejected_silently() {
        let registry = Arc::new(TunnelRegistry::new(
            Arc::new(NoAuth),
            10,
            Duration::from_secs(3600),
        ));
        let record = registry.allocate("alpha", &ctx()).await.unwrap();
        let (addr, _handle) = start(registry.clone(), Duration::from_secs(5)).await;

        let mut agent = TcpStream::connect(addr).await.unwrap();
        agent.write_all(b"nosuch\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(record.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced_at_dial_in() {
        let registry = Arc::new(TunnelRegistry::new(
            Arc::new(NoAuth),
            1,
            Duration::from_secs(3600),
        ));
        let record = registry.allocate("alpha", &ctx()).await.unwrap();
        let (addr, _handle) = start(registry.clone(), Duration::from_secs(5)).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"alpha\n").await.unwrap();
        assert!(wait_for_pool(&record, 1).await);

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"alpha\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(record.pool().size(), 1);
    }

    #[tokio::test]
    async fn test_handshake_deadline() {
        let registry = Arc::new(TunnelRegistry::new(
            Arc::new(NoAuth),
            10,
            Duration::from_secs(3600),
        ));
        let record = registry.allocate("alpha", &ctx()).await.unwrap();
        let (addr, _handle) = start(registry.clone(), Duration::from_millis(50)).await;

        // never send the newline
        let mut agent = TcpStream::connect(addr).await.unwrap();
        agent.write_all(b"alp").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(record.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_token_checked_when_auth_enabled() {
        let registry = Arc::new(TunnelRegistry::new(
            Arc::new(StaticAuth::new("key")),
            10,
            Duration::from_secs(3600),
        ));
        let good = AllocationContext {
            api_key: Some("key".to_string()),
            client_ip: "127.0.0.1".to_string(),
        };
        let record = registry.allocate("alpha", &good).await.unwrap();
        let (addr, _handle) = start(registry.clone(), Duration::from_secs(5)).await;

        // wrong token: bound to another id
        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(b"alpha\ntoken-other\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(record.pool().size(), 0);

        // matching token attaches
        let mut ok = TcpStream::connect(addr).await.unwrap();
        ok.write_all(b"alpha\ntoken-alpha\n").await.unwrap();
        assert!(wait_for_pool(&record, 1).await);
    }
}
