//! Agent connection pool supervisor
//!
//! Keeps N endpoints dialled into the gateway's tunnel port. Each worker
//! owns one socket at a time: dial, send the id/token handshake, run the
//! framed request loop, reconnect when the socket is spent. Dial failures
//! back off a fixed second; the loop never gives up.

mod handler;

pub use handler::run_endpoint;

use crate::common::http::{read_response_head, relay_body, response_framing};
use crate::common::net::configure_tcp_stream;
use crate::config::AgentConfig;
use crate::gateway::TunnelDescriptor;
use crate::{Error, Result};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Fixed delay between failed dials. Deliberately not exponential: a dead
/// gateway is polled at 1 Hz and recovery is prompt.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct Supervisor {
    config: AgentConfig,
    id: String,
    token: String,
}

impl Supervisor {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let id = config
            .id
            .clone()
            .ok_or_else(|| Error::config("agent requires a tunnel id"))?;
        let token = config.token.clone().unwrap_or_default();
        Ok(Supervisor { config, id, token })
    }

    /// Build a supervisor from a freshly allocated descriptor. The pool is
    /// capped at what the gateway advertises.
    pub fn from_descriptor(mut config: AgentConfig, descriptor: &TunnelDescriptor) -> Result<Self> {
        config.id = Some(descriptor.id.clone());
        config.token = descriptor.token.clone();
        config.tunnel_port = descriptor.port;
        config.pool_size = config.pool_size.min(descriptor.max_conn_count.max(1));
        Supervisor::new(config)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Launch the workers and run until aborted.
    pub async fn run(self) -> Result<()> {
        info!(
            "agent: tunnel {} -> 127.0.0.1:{} via {}:{} ({} endpoints)",
            self.id,
            self.config.local_port,
            self.config.gateway_host,
            self.config.tunnel_port,
            self.config.pool_size
        );

        let mut handles = Vec::new();
        for worker in 0..self.config.pool_size {
            handles.push(tokio::spawn(worker_loop(
                self.config.gateway_host.clone(),
                self.config.tunnel_port,
                self.config.local_port,
                self.id.clone(),
                self.token.clone(),
                worker,
            )));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

async fn worker_loop(
    host: String,
    tunnel_port: u16,
    local_port: u16,
    id: String,
    token: String,
    worker: usize,
) {
    loop {
        let mut stream = match TcpStream::connect((host.as_str(), tunnel_port)).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(
                    "worker {}: dial {}:{} failed: {}",
                    worker, host, tunnel_port, e
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        configure_tcp_stream(&stream);

        let mut hello = format!("{}\n", id);
        if !token.is_empty() {
            hello.push_str(&token);
            hello.push('\n');
        }
        if let Err(e) = stream.write_all(hello.as_bytes()).await {
            debug!("worker {}: handshake write failed: {}", worker, e);
            continue;
        }

        match handler::run_endpoint(stream, local_port).await {
            Ok(()) => debug!("worker {}: endpoint closed by gateway", worker),
            Err(e) => debug!("worker {}: endpoint failed: {}", worker, e),
        }
    }
}

/// Ask the gateway's public port for a tunnel descriptor: `GET /{id}` for a
/// named tunnel, `GET /?new` for a random one.
pub async fn request_descriptor(
    public_addr: &str,
    id: Option<&str>,
    api_key: Option<&str>,
) -> Result<TunnelDescriptor> {
    let mut stream = TcpStream::connect(public_addr).await?;

    let path = match id {
        Some(id) => format!("/{}", id),
        None => "/?new".to_string(),
    };
    let mut req = format!("GET {} HTTP/1.1\r\nHost: {}\r\n", path, public_addr);
    if let Some(key) = api_key {
        req.push_str(&format!("Authorization: Bearer {}\r\n", key));
    }
    req.push_str("Connection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await?;

    let mut buf = BytesMut::new();
    let resp = read_response_head(&mut stream, &mut buf).await?;
    let framing = response_framing("GET", &resp);
    let mut body = std::io::Cursor::new(Vec::new());
    relay_body(framing, &mut stream, &mut buf, &mut body).await?;
    let body = body.into_inner();

    if resp.status != 200 {
        let text = String::from_utf8_lossy(&body).trim().to_string();
        return Err(match resp.status {
            401 => Error::auth(text),
            403 => Error::invalid_id(text),
            409 => Error::conflict(text),
            _ => Error::protocol(format!("allocation failed with {}: {}", resp.status, text)),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}
