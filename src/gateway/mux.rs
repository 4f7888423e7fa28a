//! Public HTTP multiplexer
//!
//! Classifies every request on the public port and dispatches it: status
//! surfaces, admin delegation, tunnel allocation, the landing redirect, or
//! proxying through a tunnel pool. Requests addressed to a subdomain of the
//! base domain always proxy; everything else is routed by path.

use crate::auth::{client_ip, extract_api_key};
use crate::common::http::{
    has_query_key, read_request_head, relay_body, request_framing, write_simple_response,
    RequestHead,
};
use crate::common::names;
use crate::common::net::configure_tcp_stream;
use crate::config::GatewayConfig;
use crate::gateway::api::{self, AdminHandler};
use crate::gateway::proxy::{proxy_request, ProxyOutcome};
use crate::registry::{AllocationContext, TunnelRegistry};
use crate::{Error, Result};
use bytes::BytesMut;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

const TEXT_PLAIN: (&str, &str) = ("Content-Type", "text/plain; charset=utf-8");
const APPLICATION_JSON: (&str, &str) = ("Content-Type", "application/json; charset=utf-8");

/// How many fresh random ids to try before surfacing the conflict.
const RANDOM_ID_ATTEMPTS: usize = 3;

/// Where a classified request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    ServerStatus,
    Admin,
    TunnelStatus(String),
    AllocateRandom,
    AllocateNamed(String),
    Landing,
    NotFound,
    Proxy {
        id: String,
        target_override: Option<String>,
    },
}

/// Classify by host first (subdomains of the base domain always proxy),
/// then by path.
pub(crate) fn classify(host: Option<&str>, target: &str, base_domain: Option<&str>) -> Route {
    let path = target.split('?').next().unwrap_or("/");

    if let (Some(domain), Some(host)) = (base_domain, host) {
        let host = host_without_port(host).to_lowercase();
        let suffix = format!(".{}", domain.to_lowercase());
        if let Some(sub) = host.strip_suffix(suffix.as_str()) {
            if !sub.is_empty() {
                return Route::Proxy {
                    id: sub.to_string(),
                    target_override: None,
                };
            }
        }
    }

    if path == "/api/status" {
        return Route::ServerStatus;
    }
    if path.starts_with("/api/admin/") {
        return Route::Admin;
    }
    if let Some(rest) = path.strip_prefix("/api/tunnels/") {
        if let Some(id) = rest.strip_suffix("/status") {
            if !id.is_empty() && !id.contains('/') {
                return Route::TunnelStatus(id.to_string());
            }
        }
    }

    if path == "/" {
        if has_query_key(target, "new") {
            return Route::AllocateRandom;
        }
        return Route::Landing;
    }

    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match base_domain {
        Some(_) => {
            // named allocation against the apex; deeper paths have no home
            if !trimmed.is_empty() && !trimmed.contains('/') {
                Route::AllocateNamed(trimmed.to_string())
            } else {
                Route::NotFound
            }
        }
        None => {
            // path routing: first segment is the tunnel id
            let id = trimmed.split('/').next().unwrap_or("");
            if id.is_empty() {
                return Route::NotFound;
            }
            let rest = &path[1 + id.len()..];
            let rest = if rest.is_empty() { "/" } else { rest };
            let query = target.find('?').map(|i| &target[i..]).unwrap_or("");
            Route::Proxy {
                id: id.to_string(),
                target_override: Some(format!("{}{}", rest, query)),
            }
        }
    }
}

fn host_without_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match host.rfind(':') {
        Some(idx) if host[..idx].find(':').is_none() => &host[..idx],
        _ => host,
    }
}

pub struct PublicMux {
    registry: Arc<TunnelRegistry>,
    config: GatewayConfig,
    admin: Arc<dyn AdminHandler>,
}

impl PublicMux {
    pub fn new(
        registry: Arc<TunnelRegistry>,
        config: GatewayConfig,
        admin: Arc<dyn AdminHandler>,
    ) -> Self {
        PublicMux {
            registry,
            config,
            admin,
        }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("public listener on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    configure_tcp_stream(&stream);
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("public accept error: {}", e);
                }
            }
        }
    }

    /// Serve requests off one public connection until it closes or a
    /// dispatched exchange consumes it.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::with_capacity(8 * 1024);
        loop {
            let head = match read_request_head(&mut stream, &mut buf).await {
                Ok(Some(head)) => head,
                Ok(None) => return,
                Err(e) => {
                    debug!("public connection from {}: {}", peer, e);
                    return;
                }
            };
            let close_requested = head.connection_close();
            match self.dispatch(&head, &mut stream, &mut buf, peer).await {
                Ok(ProxyOutcome::KeepAlive) if !close_requested => continue,
                Ok(_) => return,
                Err(e) => {
                    debug!("public connection from {}: {}", peer, e);
                    return;
                }
            }
        }
    }

    async fn dispatch<S>(
        &self,
        head: &RequestHead,
        stream: &mut S,
        buf: &mut BytesMut,
        peer: SocketAddr,
    ) -> Result<ProxyOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let route = classify(
            head.header("host"),
            &head.target,
            self.config.base_domain.as_deref(),
        );
        debug!("{} {} -> {:?}", head.method, head.target, route);

        match route {
            Route::ServerStatus => {
                drain_body(head, stream, buf).await?;
                let status = api::server_status(&self.registry, &self.config);
                write_json(stream, 200, &status).await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::Admin => {
                let body = read_body(head, stream, buf).await?;
                let (status, reply) = self.admin.handle(head, &body).await;
                write_simple_response(
                    stream,
                    status,
                    reason_phrase(status),
                    &[APPLICATION_JSON],
                    reply.as_bytes(),
                )
                .await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::TunnelStatus(id) => {
                drain_body(head, stream, buf).await?;
                match self.registry.lookup(&id) {
                    Some(record) => {
                        write_json(stream, 200, &api::tunnel_status(&record)).await?
                    }
                    None => write_not_found(stream).await?,
                }
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::AllocateRandom => {
                drain_body(head, stream, buf).await?;
                self.allocate_random(head, stream, peer).await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::AllocateNamed(id) => {
                drain_body(head, stream, buf).await?;
                self.allocate_named(&id, head, stream, peer).await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::Landing => {
                drain_body(head, stream, buf).await?;
                write_simple_response(
                    stream,
                    302,
                    "Found",
                    &[("Location", self.config.landing_url.as_str())],
                    b"",
                )
                .await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::NotFound => {
                drain_body(head, stream, buf).await?;
                write_not_found(stream).await?;
                Ok(ProxyOutcome::KeepAlive)
            }
            Route::Proxy {
                id,
                target_override,
            } => match self.registry.lookup(&id) {
                Some(record) => {
                    proxy_request(&record, head, target_override.as_deref(), stream, buf).await
                }
                None => {
                    drain_body(head, stream, buf).await?;
                    write_not_found(stream).await?;
                    Ok(ProxyOutcome::KeepAlive)
                }
            },
        }
    }

    async fn allocate_named<S>(
        &self,
        id: &str,
        head: &RequestHead,
        stream: &mut S,
        peer: SocketAddr,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ctx = AllocationContext {
            api_key: extract_api_key(head),
            client_ip: client_ip(head, peer),
        };
        match self.registry.allocate(id, &ctx).await {
            Ok(record) => {
                let descriptor = api::descriptor(&record, &self.config);
                write_json(stream, 200, &descriptor).await
            }
            Err(e) => write_error(stream, &e).await,
        }
    }

    async fn allocate_random<S>(
        &self,
        head: &RequestHead,
        stream: &mut S,
        peer: SocketAddr,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ctx = AllocationContext {
            api_key: extract_api_key(head),
            client_ip: client_ip(head, peer),
        };
        let mut last_err = Error::internal("no allocation attempted");
        for _ in 0..RANDOM_ID_ATTEMPTS {
            let id = names::random_id();
            match self.registry.allocate(&id, &ctx).await {
                Ok(record) => {
                    let descriptor = api::descriptor(&record, &self.config);
                    return write_json(stream, 200, &descriptor).await;
                }
                Err(e @ Error::Conflict(_)) => {
                    last_err = e;
                    continue;
                }
                Err(e) => return write_error(stream, &e).await,
            }
        }
        write_error(stream, &last_err).await
    }
}

async fn drain_body<S>(head: &RequestHead, stream: &mut S, buf: &mut BytesMut) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let framing = request_framing(head)?;
    relay_body(framing, stream, buf, &mut tokio::io::sink()).await?;
    Ok(())
}

async fn read_body<S>(head: &RequestHead, stream: &mut S, buf: &mut BytesMut) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let framing = request_framing(head)?;
    let mut body = std::io::Cursor::new(Vec::new());
    relay_body(framing, stream, buf, &mut body).await?;
    Ok(body.into_inner())
}

async fn write_json<S, T>(stream: &mut S, status: u16, body: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(body)?;
    write_simple_response(stream, status, reason_phrase(status), &[APPLICATION_JSON], &body).await
}

async fn write_not_found<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_simple_response(stream, 404, "Not Found", &[TEXT_PLAIN], b"404 page not found").await
}

/// Allocation failures map onto 409/401/403; anything unexpected is
/// reported as a conflict too rather than leaking internals.
async fn write_error<S>(stream: &mut S, e: &Error) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let status = match e {
        Error::Auth(_) => 401,
        Error::InvalidId(_) => 403,
        _ => 409,
    };
    write_simple_response(
        stream,
        status,
        reason_phrase(status),
        &[TEXT_PLAIN],
        e.to_string().as_bytes(),
    )
    .await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    }
}
