//! Request and upgrade proxying onto tunnel endpoints
//!
//! One framed exchange per call: the public request is serialised onto a
//! pooled endpoint, a single response is parsed back off the endpoint's
//! long-lived residue buffer and streamed to the public socket. Endpoint
//! failures sacrifice the endpoint and surface as 502; a successful
//! exchange returns the endpoint to circulation untouched.

use crate::common::http::{
    read_response_head, relay_body, request_framing, response_framing, write_request_head,
    write_simple_response, BodyFraming, RequestHead, ResponseHead,
};
use crate::common::net;
use crate::registry::{EndpointIo, TunnelRecord};
use crate::{Error, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

const TEXT_PLAIN: (&str, &str) = ("Content-Type", "text/plain; charset=utf-8");

/// What the public connection can do after a proxied exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// The connection framing is intact; serve another request.
    KeepAlive,
    /// The connection is spent (upgrade, close semantics, or framing loss).
    Close,
}

/// Proxy one public request through the tunnel's pool.
///
/// `Err` means the public socket itself failed and must be dropped without
/// further writes; all upstream failures are answered with 502 in-band.
pub async fn proxy_request<P>(
    record: &TunnelRecord,
    head: &RequestHead,
    target_override: Option<&str>,
    public: &mut P,
    public_buf: &mut BytesMut,
) -> Result<ProxyOutcome>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    record.touch();

    if head.wants_websocket_upgrade() {
        return proxy_upgrade(record, head, target_override, public, public_buf).await;
    }

    let req_framing = match request_framing(head) {
        Ok(framing) => framing,
        Err(e) => {
            debug!("unparseable request framing: {}", e);
            write_simple_response(public, 400, "Bad Request", &[TEXT_PLAIN], b"Bad Request")
                .await?;
            return Ok(ProxyOutcome::Close);
        }
    };

    let Some(endpoint) = record.pool().next() else {
        debug!("tunnel {} has no endpoints", record.id());
        relay_body(req_framing, public, public_buf, &mut tokio::io::sink()).await?;
        write_simple_response(
            public,
            502,
            "Bad Gateway",
            &[TEXT_PLAIN],
            b"No available connections",
        )
        .await?;
        return Ok(ProxyOutcome::KeepAlive);
    };

    let mut guard = endpoint.lock().await;

    // Request out, response head back. Any failure in here is fatal for the
    // endpoint: it is taken (closed) and detached below.
    let exchanged = match guard.as_mut() {
        None => Err(Error::upstream("endpoint already closed")),
        Some(io) => {
            forward_request(io, head, target_override, req_framing, public, public_buf).await
        }
    };

    let resp = match exchanged {
        Ok(resp) => resp,
        Err(e) => {
            warn!(
                "tunnel {} endpoint {} failed: {}",
                record.id(),
                endpoint.id(),
                e
            );
            drop(endpoint.take(&mut guard));
            drop(guard);
            record.pool().detach(endpoint.id());
            write_simple_response(public, 502, "Bad Gateway", &[TEXT_PLAIN], b"Proxy error")
                .await?;
            // the request body may be half-consumed; public framing is gone
            return Ok(ProxyOutcome::Close);
        }
    };

    let resp_framing = response_framing(&head.method, &resp);
    let relayed = match guard.as_mut() {
        None => Err(Error::upstream("endpoint vanished mid response")),
        Some(io) => stream_response(io, &resp, resp_framing, public).await,
    };

    if let Err(e) = relayed {
        drop(endpoint.take(&mut guard));
        drop(guard);
        record.pool().detach(endpoint.id());
        return Err(e);
    }

    if !resp_framing.is_delimited() {
        // body ran to endpoint EOF; the endpoint cannot carry another frame
        drop(endpoint.take(&mut guard));
        drop(guard);
        record.pool().detach(endpoint.id());
        return Ok(ProxyOutcome::Close);
    }

    drop(guard);

    if head.connection_close() || resp.connection_close() {
        Ok(ProxyOutcome::Close)
    } else {
        Ok(ProxyOutcome::KeepAlive)
    }
}

async fn forward_request<P>(
    io: &mut EndpointIo,
    head: &RequestHead,
    target_override: Option<&str>,
    req_framing: BodyFraming,
    public: &mut P,
    public_buf: &mut BytesMut,
) -> Result<ResponseHead>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    write_request_head(&mut io.stream, head, target_override, None).await?;
    relay_body(req_framing, public, public_buf, &mut io.stream).await?;
    read_response_head(&mut io.stream, &mut io.residue).await
}

async fn stream_response<P>(
    io: &mut EndpointIo,
    resp: &ResponseHead,
    resp_framing: BodyFraming,
    public: &mut P,
) -> Result<()>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    public.write_all(&resp.raw_head).await?;
    relay_body(resp_framing, &mut io.stream, &mut io.residue, public).await?;
    Ok(())
}

/// Upgrade path: forward the request, then splice raw bytes both ways.
/// The endpoint leaves the pool for good; the copy pair owns both sockets
/// and dropping them is the single close.
async fn proxy_upgrade<P>(
    record: &TunnelRecord,
    head: &RequestHead,
    target_override: Option<&str>,
    public: &mut P,
    public_buf: &mut BytesMut,
) -> Result<ProxyOutcome>
where
    P: AsyncRead + AsyncWrite + Unpin,
{
    let Some(endpoint) = record.pool().next() else {
        debug!("tunnel {} has no endpoints for upgrade", record.id());
        return Ok(ProxyOutcome::Close);
    };
    record.pool().detach(endpoint.id());

    let mut guard = endpoint.lock().await;
    let Some(mut io) = endpoint.take(&mut guard) else {
        return Ok(ProxyOutcome::Close);
    };
    drop(guard);

    if let Err(e) = write_request_head(&mut io.stream, head, target_override, None).await {
        debug!("upgrade request write failed: {}", e);
        return Ok(ProxyOutcome::Close);
    }

    // flush bytes that were buffered ahead of the splice, both directions
    if !public_buf.is_empty() {
        if io.stream.write_all(&public_buf[..]).await.is_err() {
            return Ok(ProxyOutcome::Close);
        }
        public_buf.clear();
    }
    if !io.residue.is_empty() {
        public.write_all(&io.residue[..]).await?;
        io.residue.clear();
    }

    match net::copy_bidirectional(public, &mut io.stream).await {
        Ok((up, down)) => debug!(
            "upgrade on tunnel {} finished ({} up, {} down)",
            record.id(),
            up,
            down
        ),
        Err(e) => debug!("upgrade on tunnel {} ended: {}", record.id(), e),
    }
    Ok(ProxyOutcome::Close)
}
