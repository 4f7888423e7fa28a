//! Agent request handler
//!
//! Runs the framed loop over one endpoint socket: read a request from the
//! gateway, dial the loopback target, forward, answer. A 101 response to an
//! upgrade request flips the socket to opaque splicing and ends the loop;
//! the supervisor dials a replacement endpoint.

use crate::common::http::{
    read_request_head, read_response_head, relay_body, request_framing, response_framing,
    write_request_head, write_simple_response,
};
use crate::common::net::{configure_tcp_stream, copy_bidirectional};
use crate::Result;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Serve framed exchanges until the endpoint closes or goes opaque.
///
/// `Err` (or a clean `Ok`) always means the socket is spent; the caller
/// reconnects.
pub async fn run_endpoint(mut stream: TcpStream, local_port: u16) -> Result<()> {
    let mut residue = BytesMut::with_capacity(8 * 1024);
    let local_host = format!("127.0.0.1:{}", local_port);

    loop {
        let head = match read_request_head(&mut stream, &mut residue).await? {
            Some(head) => head,
            None => return Ok(()),
        };
        let req_framing = request_framing(&head)?;
        let wants_upgrade = head.wants_websocket_upgrade();

        let mut local = match TcpStream::connect(("127.0.0.1", local_port)).await {
            Ok(local) => local,
            Err(e) => {
                debug!("local dial to 127.0.0.1:{} failed: {}", local_port, e);
                // consume the request body so the next frame still parses
                relay_body(req_framing, &mut stream, &mut residue, &mut tokio::io::sink())
                    .await?;
                write_simple_response(
                    &mut stream,
                    502,
                    "Bad Gateway",
                    &[("Content-Type", "text/plain; charset=utf-8")],
                    b"Bad Gateway",
                )
                .await?;
                continue;
            }
        };
        configure_tcp_stream(&local);

        // forward the request, retargeted at the loopback host
        if write_request_head(&mut local, &head, None, Some(local_host.as_str()))
            .await
            .is_err()
        {
            relay_body(req_framing, &mut stream, &mut residue, &mut tokio::io::sink()).await?;
            continue;
        }
        relay_body(req_framing, &mut stream, &mut residue, &mut local).await?;

        // one response back
        let mut local_buf = BytesMut::with_capacity(8 * 1024);
        let resp = match read_response_head(&mut local, &mut local_buf).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("local service gave no response: {}", e);
                continue;
            }
        };

        if wants_upgrade && resp.status == 101 {
            // headers only, then raw splice in both directions
            stream.write_all(&resp.raw_head).await?;
            if !local_buf.is_empty() {
                stream.write_all(&local_buf[..]).await?;
                local_buf.clear();
            }
            if !residue.is_empty() {
                local.write_all(&residue[..]).await?;
                residue.clear();
            }
            match copy_bidirectional(&mut stream, &mut local).await {
                Ok((up, down)) => debug!("upgrade ended ({} up, {} down)", up, down),
                Err(e) => debug!("upgrade ended: {}", e),
            }
            return Ok(());
        }

        stream.write_all(&resp.raw_head).await?;
        let resp_framing = response_framing(&head.method, &resp);
        relay_body(resp_framing, &mut local, &mut local_buf, &mut stream).await?;
        // local connection closes here; the endpoint stays framed
    }
}
